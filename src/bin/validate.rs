// src/bin/validate.rs
// ============================================================================
// LAYERS-MODEL VALIDATOR - Validación estricta de artefactos
// ============================================================================
//
// Valida model.json + shards referenciados:
//   - estructura del manifest (claves, dtypes, quant, duplicados)
//   - invariante de tamaño (Σ bytes esperados == bytes de shard)
//   - rangos por entry (truncamiento, fronteras de shard)
//   - decuantización de entries cuantizados
//
// Uso:
//   validate model_dir/ [-v]
//   validate model_dir/model.json [-v]
//
// ============================================================================

use std::path::PathBuf;
use std::process;

use clap::Parser;

use tfjs_convert::artifact::{validate_path, ValidationReport, MANIFEST_FILE};

#[derive(Parser, Debug)]
#[command(name = "validate")]
#[command(about = "Strict validator for TensorFlow.js layers-model artifacts")]
#[command(version)]
struct Args {
    /// Artifact to validate: model.json or its directory
    file: PathBuf,

    /// Verbose output (per-shard sizes and checksums)
    #[arg(short, long)]
    verbose: bool,
}

fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", size as f64 / 1024.0 / 1024.0 / 1024.0)
    } else if size >= 1024 * 1024 {
        format!("{:.2} MB", size as f64 / 1024.0 / 1024.0)
    } else if size >= 1024 {
        format!("{:.2} KB", size as f64 / 1024.0)
    } else {
        format!("{} bytes", size)
    }
}

fn print_report(report: &ValidationReport, verbose: bool) {
    println!("\n{}", "─".repeat(72));
    println!("GROUPS");

    for group in &report.groups {
        println!(
            "  [{}] {} entries ({} quantized), expected {}, on disk {}",
            group.index,
            group.entries,
            group.quantized,
            format_size(group.expected_bytes),
            format_size(group.actual_bytes),
        );

        if verbose {
            for shard in &group.shards {
                println!(
                    "      {:30} {:>12}  crc32 0x{:08X}",
                    shard.path,
                    format_size(shard.bytes),
                    shard.crc32
                );
            }
        }
    }

    println!("\n{}", "─".repeat(72));
    println!("RESULT");

    if report.is_valid() {
        println!("\n  ✓ VALID");
    } else {
        println!("\n  ✗ INVALID");
    }

    println!("    Fatal issues: {}", report.fatal_count());
    println!("    Warnings:     {}", report.warn_count());

    if !report.issues.is_empty() {
        println!("\n  Issues:");
        for issue in &report.issues {
            println!("    • {}", issue);
        }
    }
}

fn main() {
    let args = Args::parse();

    let manifest_path = if args.file.is_dir() {
        args.file.join(MANIFEST_FILE)
    } else {
        args.file.clone()
    };

    if !manifest_path.exists() {
        eprintln!("Error: manifest not found: {}", manifest_path.display());
        process::exit(1);
    }

    println!("{}", "=".repeat(72));
    println!("LAYERS-MODEL STRICT VALIDATOR");
    println!("{}", "=".repeat(72));
    println!("  Manifest: {}", manifest_path.display());

    let report = match validate_path(&manifest_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading manifest: {}", e);
            process::exit(1);
        }
    };

    print_report(&report, args.verbose);

    println!("\n{}", "=".repeat(72));
    if report.is_valid() {
        println!("✓ VALIDATION PASSED");
    } else {
        println!("✗ VALIDATION FAILED");
    }
    println!("{}\n", "=".repeat(72));

    process::exit(if report.is_valid() { 0 } else { 1 });
}
