// src/main.rs
// ============================================================================
// TFJS-CONVERT CLI
// ============================================================================
//
// Uso:
//   tfjs-convert ./model_fp32 -o ./model_q8 -q uint8
//   tfjs-convert ./model_fp32/model.json -o ./out --shard-size 1048576 --validate
//
// Lee un artefacto layers-model existente, lo re-codifica con el esquema
// elegido y lo escribe en el directorio de salida.
//
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use tfjs_convert::{
    artifact::MANIFEST_FILE, builder::convert_with_progress, validate_path, ArtifactReader,
    ConvertOptions, QuantScheme,
};

#[derive(Parser, Debug)]
#[command(name = "tfjs-convert")]
#[command(about = "Re-encode TensorFlow.js layers-model artifacts with optional quantization")]
#[command(version)]
struct Args {
    /// Input artifact: model.json or its directory
    #[arg(value_name = "MODEL")]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Quantization scheme: none, uint8 or uint16
    #[arg(short, long, default_value = "none")]
    quantization: String,

    /// Maximum bytes per weight shard
    #[arg(long, default_value_t = tfjs_convert::artifact::DEFAULT_SHARD_BYTES)]
    shard_size: u64,

    /// Validate the produced artifact after writing
    #[arg(long)]
    validate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let scheme = QuantScheme::from_str(&args.quantization)
        .ok_or_else(|| anyhow::anyhow!("Invalid quantization scheme: {}", args.quantization))?;

    let manifest_path = if args.input.is_dir() {
        args.input.join(MANIFEST_FILE)
    } else {
        args.input.clone()
    };

    println!("═══════════════════════════════════════════════════════════════");
    println!("  TFJS CONVERTER - layers-model codec");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Input:       {}", manifest_path.display());
    println!("  Quant:       {}", scheme);
    println!("  Shard size:  {} bytes", args.shard_size);
    println!("  Output:      {}", args.output.display());
    println!("═══════════════════════════════════════════════════════════════");

    let reader = ArtifactReader::open(&manifest_path)
        .with_context(|| format!("Failed to open artifact {}", manifest_path.display()))?;

    if args.verbose {
        println!("  Tensors: {}", reader.len());
        println!("  Groups:  {}", reader.manifest().weights_manifest.len());
    }

    // el generatedBy original se conserva; convertedBy pasa a ser esta tool
    let options = ConvertOptions {
        scheme,
        max_shard_bytes: args.shard_size,
        generated_by: Some(reader.manifest().generated_by.clone()),
        converted_by: None,
    };

    let pb = ProgressBar::new(reader.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("  [{bar:40}] {pos}/{len} {msg}")
            .expect("static template")
            .progress_chars("=> "),
    );

    let (artifact, stats) = convert_with_progress(&reader, &options, &mut |idx, _, name| {
        pb.set_position(idx as u64);
        pb.set_message(name.to_string());
    })?;
    pb.finish_and_clear();

    artifact
        .persist(&args.output)
        .with_context(|| format!("Failed to write artifact to {}", args.output.display()))?;

    if args.validate {
        println!("\n[VALIDATE] Checking written artifact...");
        let report = validate_path(args.output.join(MANIFEST_FILE))?;
        for issue in &report.issues {
            println!("  {}", issue);
        }
        if !report.is_valid() {
            anyhow::bail!("validation failed: {} fatal issue(s)", report.fatal_count());
        }
        println!("  ✓ Valid ({} entries)", report.entry_count);
    }

    let elapsed = start.elapsed();

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  CONVERSION COMPLETE");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Time:       {:.1}s", elapsed.as_secs_f64());
    println!(
        "  Tensors:    {} (float32:{}, uint8:{}, uint16:{})",
        stats.total_tensors(),
        stats.float32_count,
        stats.uint8_count,
        stats.uint16_count
    );
    println!("  Shards:     {}", stats.shard_count);
    println!(
        "  Blob bytes: {} ({:.1} KB)",
        stats.total_bytes,
        stats.total_bytes as f64 / 1024.0
    );
    println!("  Output:     {}", args.output.display());
    println!("═══════════════════════════════════════════════════════════════");

    Ok(())
}
