// src/artifact/validate.rs
// ============================================================================
// ARTIFACT VALIDATOR - Pasada única que acumula todos los problemas
// ============================================================================
//
// A diferencia del camino de codificación (que aborta al primer error), el
// validador recorre el artefacto completo y reporta todo lo que encuentra:
// un consumidor inspeccionando un artefacto ajeno quiere el diagnóstico
// entero, no el primer tropiezo.
//
// Solo lectura, idempotente: se puede invocar N veces y en paralelo.
//
// ============================================================================

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{CodecError, Result};
use crate::manifest::{Dtype, Manifest};
use crate::quant;

/// Un problema encontrado durante la validación.
#[derive(Debug)]
pub struct ValidationIssue {
    pub category: String,
    pub message: String,
    pub fatal: bool,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.fatal { "FATAL" } else { "WARN" };
        write!(f, "[{}] {}: {}", prefix, self.category, self.message)
    }
}

/// Información por shard (diagnóstico).
#[derive(Debug, Clone)]
pub struct ShardInfo {
    pub path: String,
    pub bytes: u64,
    /// CRC32 del contenido; diagnóstico, no forma parte del formato.
    pub crc32: u32,
}

/// Resumen por grupo de pesos.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub index: usize,
    pub entries: usize,
    pub quantized: usize,
    pub expected_bytes: u64,
    pub actual_bytes: u64,
    pub shards: Vec<ShardInfo>,
}

/// Resultado completo de la validación.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub groups: Vec<GroupReport>,
    pub entry_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.fatal)
    }

    pub fn fatal_count(&self) -> usize {
        self.issues.iter().filter(|i| i.fatal).count()
    }

    pub fn warn_count(&self) -> usize {
        self.issues.iter().filter(|i| !i.fatal).count()
    }

    fn add(&mut self, category: &str, message: impl Into<String>, fatal: bool) {
        self.issues.push(ValidationIssue {
            category: category.to_string(),
            message: message.into(),
            fatal,
        });
    }
}

/// Valida manifest + shards ya cargados en memoria.
///
/// `blobs[g]` son los contenidos de los shards del grupo `g`, en el orden
/// de `paths`. Un shard que no pudo cargarse se representa vacío (el
/// faltante ya habrá sido reportado por el caller).
pub fn validate_slices(manifest: &Manifest, blobs: &[Vec<&[u8]>]) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_structure(manifest, &mut report);

    for (gi, group) in manifest.weights_manifest.iter().enumerate() {
        let empty: Vec<&[u8]> = Vec::new();
        let shards = blobs.get(gi).unwrap_or(&empty);

        if shards.len() != group.paths.len() {
            report.add(
                "FILES",
                format!(
                    "group {}: {} paths in manifest, {} shards supplied",
                    gi,
                    group.paths.len(),
                    shards.len()
                ),
                true,
            );
        }

        let shard_infos: Vec<ShardInfo> = group
            .paths
            .iter()
            .enumerate()
            .map(|(si, path)| {
                let bytes = shards.get(si).copied().unwrap_or(&[]);
                ShardInfo {
                    path: path.clone(),
                    bytes: bytes.len() as u64,
                    crc32: crc32fast::hash(bytes),
                }
            })
            .collect();

        let actual: u64 = shard_infos.iter().map(|s| s.bytes).sum();
        let expected = group.expected_bytes();

        // Invariante de tamaño: Σ byte_len(entry) == bytes disponibles
        if expected != actual {
            report.add(
                "SIZE",
                CodecError::SizeMismatch {
                    group: gi,
                    expected,
                    actual,
                }
                .to_string(),
                true,
            );
        }

        check_ranges(gi, group, &shard_infos, &mut report);
        let quantized = check_quant(gi, group, shards, &shard_infos, &mut report);

        report.groups.push(GroupReport {
            index: gi,
            entries: group.weights.len(),
            quantized,
            expected_bytes: expected,
            actual_bytes: actual,
            shards: shard_infos,
        });
    }

    report.entry_count = manifest.total_entries();
    report
}

/// Valida un artefacto en disco resolviendo los shards relativos al
/// manifest. Solo un manifest ilegible a nivel de E/S produce `Err`; todo
/// lo demás se acumula en el reporte.
pub fn validate_path(manifest_path: impl AsRef<Path>) -> Result<ValidationReport> {
    let manifest_path = manifest_path.as_ref();
    let data = std::fs::read(manifest_path)?;

    let manifest = match serde_json::from_slice::<Manifest>(&data) {
        Ok(m) => m,
        Err(e) => {
            let mut report = ValidationReport::default();
            report.add("MANIFEST", format!("invalid JSON: {}", e), true);
            return Ok(report);
        }
    };

    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    // cargar shards; los que falten entran como vacíos y quedan reportados
    let mut report_files: Vec<ValidationIssue> = Vec::new();
    let mut mmaps: Vec<Vec<Option<Mmap>>> = Vec::new();

    for group in &manifest.weights_manifest {
        let mut group_maps = Vec::with_capacity(group.paths.len());
        for path in &group.paths {
            let full = dir.join(path);
            let mapped = File::open(&full)
                .and_then(|f| unsafe { Mmap::map(&f) })
                .map_err(|e| {
                    report_files.push(ValidationIssue {
                        category: "FILES".to_string(),
                        message: format!("cannot read shard {}: {}", full.display(), e),
                        fatal: true,
                    });
                    e
                })
                .ok();
            group_maps.push(mapped);
        }
        mmaps.push(group_maps);
    }

    let blobs: Vec<Vec<&[u8]>> = mmaps
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|m| m.as_deref().unwrap_or(&[]))
                .collect()
        })
        .collect();

    let mut report = validate_slices(&manifest, &blobs);
    report.issues.extend(report_files);
    Ok(report)
}

fn check_structure(manifest: &Manifest, report: &mut ValidationReport) {
    if manifest.format.is_empty() {
        report.add("MANIFEST", "empty 'format' field", true);
    } else if manifest.format != crate::manifest::FORMAT_LAYERS_MODEL {
        report.add(
            "MANIFEST",
            format!("unexpected format '{}'", manifest.format),
            false,
        );
    }

    if manifest.weights_manifest.is_empty() {
        report.add("MANIFEST", "weightsManifest is empty", false);
    }

    let mut seen = std::collections::HashSet::new();
    for (gi, group) in manifest.weights_manifest.iter().enumerate() {
        if group.paths.is_empty() && !group.weights.is_empty() {
            report.add(
                "STRUCTURE",
                format!("group {} has entries but no paths", gi),
                true,
            );
        }

        for entry in &group.weights {
            if !seen.insert(entry.name.as_str()) {
                report.add(
                    "STRUCTURE",
                    CodecError::DuplicateTensor(entry.name.clone()).to_string(),
                    true,
                );
            }

            if entry.shape.iter().any(|&d| d == 0) {
                report.add(
                    "STRUCTURE",
                    format!("entry '{}': zero dimension in {:?}", entry.name, entry.shape),
                    true,
                );
            }

            match (entry.dtype, &entry.quant) {
                (Dtype::Float32, Some(_)) => {
                    // los lectores lo ignoran, pero delata un productor confundido
                    report.add(
                        "STRUCTURE",
                        format!("entry '{}': quant params on float32", entry.name),
                        false,
                    );
                }
                (Dtype::Uint8 | Dtype::Uint16, None) => {
                    report.add(
                        "STRUCTURE",
                        format!(
                            "entry '{}': {} without quant params, not reconstructible",
                            entry.name,
                            entry.dtype.as_str()
                        ),
                        true,
                    );
                }
                _ => {}
            }

            if let Some(q) = &entry.quant {
                if !q.scale.is_finite() || !q.min.is_finite() {
                    report.add(
                        "STRUCTURE",
                        format!(
                            "entry '{}': non-finite quant params (scale={}, min={})",
                            entry.name, q.scale, q.min
                        ),
                        true,
                    );
                }
            }
        }
    }
}

fn check_ranges(
    gi: usize,
    group: &crate::manifest::WeightGroup,
    shards: &[ShardInfo],
    report: &mut ValidationReport,
) {
    let lens: Vec<u64> = shards.iter().map(|s| s.bytes).collect();
    let total: u64 = lens.iter().sum();

    let mut shard = 0usize;
    let mut offset = 0u64;
    let mut consumed = 0u64;

    for entry in &group.weights {
        let len = entry.byte_len();

        while shard < lens.len() && offset == lens[shard] {
            shard += 1;
            offset = 0;
        }

        if consumed + len > total {
            report.add(
                "RANGES",
                CodecError::TruncatedBlob {
                    name: entry.name.clone(),
                    offset: consumed,
                    size: len,
                    available: total,
                }
                .to_string(),
                true,
            );
            // seguir acumulando offsets para reportar el resto igual
            consumed += len;
            continue;
        }

        if shard >= lens.len() || offset + len > lens[shard] {
            report.add(
                "RANGES",
                format!(
                    "group {}: entry '{}' spans a shard boundary",
                    gi, entry.name
                ),
                true,
            );
            consumed += len;
            continue;
        }

        offset += len;
        consumed += len;
    }
}

/// Decuantiza los entries cuantizados alcanzables. Devuelve cuántos había.
fn check_quant(
    gi: usize,
    group: &crate::manifest::WeightGroup,
    shards: &[&[u8]],
    shard_infos: &[ShardInfo],
    report: &mut ValidationReport,
) -> usize {
    let lens: Vec<u64> = shard_infos.iter().map(|s| s.bytes).collect();
    let spans = match super::reader::compute_spans(group, &lens) {
        Ok(s) => s,
        // los problemas de rango ya quedaron reportados por check_ranges
        Err(_) => return group.weights.iter().filter(|e| e.quant.is_some()).count(),
    };

    let mut quantized = 0;
    for (entry, span) in group.weights.iter().zip(spans) {
        if entry.quant.is_none() {
            continue;
        }
        quantized += 1;

        let Some(bytes) = shards
            .get(span.shard)
            .map(|s| &s[span.offset..span.offset + span.len])
        else {
            continue;
        };

        match quant::dequantize(bytes, entry.dtype, entry.quant.as_ref()) {
            Ok(values) => {
                if values.len() != entry.numel() {
                    report.add(
                        "QUANT",
                        format!(
                            "group {}: entry '{}' dequantized to {} values, expected {}",
                            gi,
                            entry.name,
                            values.len(),
                            entry.numel()
                        ),
                        true,
                    );
                }
            }
            Err(e) => report.add("QUANT", e.to_string(), true),
        }
    }

    quantized
}
