// src/bin/inspect.rs
// ============================================================================
// LAYERS-MODEL INSPECTOR - Inspecciona estructura de artefactos
// ============================================================================
//
// Uso: inspect model_dir/ [--topology] [--weights]
//
// ============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use tfjs_convert::artifact::MANIFEST_FILE;
use tfjs_convert::manifest::Manifest;

#[derive(Parser)]
#[command(name = "inspect")]
#[command(about = "Inspect TensorFlow.js layers-model artifact structure")]
#[command(version)]
struct Args {
    /// Artifact to inspect: model.json or its directory
    file: PathBuf,

    /// Dump the model topology JSON
    #[arg(long)]
    topology: bool,

    /// List every weight entry
    #[arg(long)]
    weights: bool,
}

fn format_size(size: u64) -> String {
    if size == 0 {
        "empty".to_string()
    } else if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size as f64 / 1024.0 / 1024.0)
    } else {
        format!("{:.2} GB", size as f64 / 1024.0 / 1024.0 / 1024.0)
    }
}

fn make_bar(size: u64, max_size: u64, width: usize) -> String {
    if max_size == 0 || size == 0 {
        "░".repeat(width)
    } else {
        let ratio = (size as f64 / max_size as f64).min(1.0);
        // mínimo 1 bloque si hay datos
        let filled = ((ratio * width as f64) as usize).max(1);
        "█".repeat(filled) + &"░".repeat(width.saturating_sub(filled))
    }
}

/// Resumen de una topología opaca: class_name y cantidad de capas si
/// el árbol tiene la forma habitual de Keras.
fn topology_summary(topology: &serde_json::Value) -> String {
    let class = topology
        .get("model_config")
        .and_then(|c| c.get("class_name"))
        .or_else(|| topology.get("class_name"))
        .and_then(|v| v.as_str())
        .unwrap_or("?");

    let layers = topology
        .get("model_config")
        .and_then(|c| c.get("config"))
        .or_else(|| topology.get("config"))
        .and_then(|c| c.get("layers"))
        .and_then(|l| l.as_array())
        .map(|l| l.len());

    match layers {
        Some(n) => format!("{} ({} layers)", class, n),
        None => class.to_string(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let manifest_path = if args.file.is_dir() {
        args.file.join(MANIFEST_FILE)
    } else {
        args.file.clone()
    };
    let dir = manifest_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let data = std::fs::read(&manifest_path)
        .with_context(|| format!("Cannot read {}", manifest_path.display()))?;
    let manifest = Manifest::from_slice(&data)
        .with_context(|| format!("Cannot parse {}", manifest_path.display()))?;

    println!("{}", "=".repeat(72));
    println!("LAYERS-MODEL INSPECTOR");
    println!("{}", "=".repeat(72));
    println!("  Manifest:    {} ({})", manifest_path.display(), format_size(data.len() as u64));
    println!("  Format:      {}", manifest.format);
    println!("  GeneratedBy: {}", manifest.generated_by);
    println!("  ConvertedBy: {}", manifest.converted_by);
    println!("  Topology:    {}", topology_summary(&manifest.model_topology));

    for (gi, group) in manifest.weights_manifest.iter().enumerate() {
        println!("\n{}", "─".repeat(72));
        println!(
            "GROUP {} - {} entries, {} expected",
            gi,
            group.weights.len(),
            format_size(group.expected_bytes())
        );

        // tamaños reales en disco, si los shards están al lado del manifest
        let sizes: Vec<u64> = group
            .paths
            .iter()
            .map(|p| std::fs::metadata(dir.join(p)).map(|m| m.len()).unwrap_or(0))
            .collect();
        let max_size = sizes.iter().copied().max().unwrap_or(0);

        for (path, &size) in group.paths.iter().zip(&sizes) {
            println!(
                "  {:30} {} {:>10}",
                path,
                make_bar(size, max_size, 24),
                format_size(size)
            );
        }

        if args.weights {
            println!();
            for entry in &group.weights {
                let quant = match &entry.quant {
                    Some(q) => format!("  quant(scale={}, min={})", q.scale, q.min),
                    None => String::new(),
                };
                println!(
                    "  {:40} {:10} {:?} = {} elem, {}{}",
                    entry.name,
                    entry.dtype.as_str(),
                    entry.shape,
                    entry.numel(),
                    format_size(entry.byte_len()),
                    quant
                );
            }
        }
    }

    if args.topology {
        println!("\n{}", "─".repeat(72));
        println!("TOPOLOGY");
        println!("{}", serde_json::to_string_pretty(&manifest.model_topology)?);
    }

    println!();
    Ok(())
}
