// src/artifact/reader.rs
// ============================================================================
// ARTIFACT READER - Lee artefactos layers-model (model.json + shards)
// ============================================================================
//
// Los shards de un grupo se tratan como una concatenación lógica; el offset
// de cada entry es la suma de los byte lengths de los entries anteriores.
// Invariante del formato: ningún entry cruza de un shard al siguiente.
//
// ============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{CodecError, Result};
use crate::manifest::{Manifest, WeightEntry, WeightGroup};
use crate::quant;
use crate::tensor::{Tensor, TensorSource};

/// Ubicación física de un entry dentro de los shards de su grupo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub shard: usize,
    pub offset: usize,
    pub len: usize,
}

/// Calcula el span de cada entry de un grupo dados los tamaños reales de
/// sus shards. Falla si un entry queda truncado o cruzaría dos shards.
pub(crate) fn compute_spans(group: &WeightGroup, shard_lens: &[u64]) -> Result<Vec<Span>> {
    let total: u64 = shard_lens.iter().sum();
    let mut spans = Vec::with_capacity(group.weights.len());

    let mut shard = 0usize;
    let mut offset = 0u64;
    let mut consumed = 0u64;

    for entry in &group.weights {
        let len = entry.byte_len();

        // avanzar a través de shards ya agotados
        while shard < shard_lens.len() && offset == shard_lens[shard] {
            shard += 1;
            offset = 0;
        }

        if consumed + len > total {
            return Err(CodecError::TruncatedBlob {
                name: entry.name.clone(),
                offset: consumed,
                size: len,
                available: total,
            });
        }

        if shard >= shard_lens.len() || offset + len > shard_lens[shard] {
            return Err(CodecError::ManifestMalformed(format!(
                "entry '{}' would span a shard boundary",
                entry.name
            )));
        }

        spans.push(Span {
            shard,
            offset: offset as usize,
            len: len as usize,
        });

        offset += len;
        consumed += len;
    }

    Ok(spans)
}

/// Artefacto abierto para lectura. Los shards van memory-mapped.
pub struct ArtifactReader {
    manifest: Manifest,
    dir: PathBuf,
    shards: Vec<Vec<Mmap>>,
    spans: Vec<Vec<Span>>,
    index: HashMap<String, (usize, usize)>,
}

impl ArtifactReader {
    /// Abre `model.json` y todos los shards que referencia.
    pub fn open(manifest_path: impl AsRef<Path>) -> Result<Self> {
        let manifest_path = manifest_path.as_ref();
        let data = std::fs::read(manifest_path)?;
        let manifest = Manifest::from_slice(&data)?;

        let dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut shards = Vec::with_capacity(manifest.weights_manifest.len());
        let mut spans = Vec::with_capacity(manifest.weights_manifest.len());
        let mut index = HashMap::new();

        for (gi, group) in manifest.weights_manifest.iter().enumerate() {
            let mut group_shards = Vec::with_capacity(group.paths.len());
            for path in &group.paths {
                let file = File::open(dir.join(path))?;
                // mapeo de solo lectura; el artefacto es inmutable una vez escrito
                let mmap = unsafe { Mmap::map(&file)? };
                group_shards.push(mmap);
            }

            let shard_lens: Vec<u64> = group_shards.iter().map(|m| m.len() as u64).collect();
            let group_spans = compute_spans(group, &shard_lens)?;

            for (ei, entry) in group.weights.iter().enumerate() {
                // Manifest::check ya rechazó duplicados
                index.insert(entry.name.clone(), (gi, ei));
            }

            shards.push(group_shards);
            spans.push(group_spans);
        }

        Ok(Self {
            manifest,
            dir,
            shards,
            spans,
            index,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cantidad total de entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<&WeightEntry> {
        let &(gi, ei) = self.index.get(name)?;
        Some(&self.manifest.weights_manifest[gi].weights[ei])
    }

    /// Bytes crudos de un entry (rango dentro de su shard).
    pub fn read_raw(&self, name: &str) -> Result<&[u8]> {
        let &(gi, ei) = self.index.get(name).ok_or_else(|| {
            CodecError::ManifestMalformed(format!("tensor '{}' not in manifest", name))
        })?;
        let span = self.spans[gi][ei];
        Ok(&self.shards[gi][span.shard][span.offset..span.offset + span.len])
    }

    /// Valores f32 de un entry, decuantizando si lleva `quant`.
    pub fn read_f32(&self, name: &str) -> Result<Vec<f32>> {
        let entry = self.entry(name).ok_or_else(|| {
            CodecError::ManifestMalformed(format!("tensor '{}' not in manifest", name))
        })?;
        let raw = self.read_raw(name)?;
        quant::dequantize(raw, entry.dtype, entry.quant.as_ref())
    }
}

// El reader es también la fuente de tensores para re-codificar un
// artefacto existente con otro esquema.
impl TensorSource for ArtifactReader {
    fn topology(&self) -> Result<serde_json::Value> {
        Ok(self.manifest.model_topology.clone())
    }

    fn tensors(&self) -> Result<Vec<Tensor>> {
        let mut out = Vec::with_capacity(self.len());
        for group in &self.manifest.weights_manifest {
            for entry in &group.weights {
                out.push(Tensor {
                    name: entry.name.clone(),
                    shape: entry.shape.clone(),
                    values: self.read_f32(&entry.name)?,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Dtype;

    fn entry(name: &str, shape: Vec<usize>, dtype: Dtype) -> WeightEntry {
        WeightEntry {
            name: name.to_string(),
            shape,
            dtype,
            quant: match dtype {
                Dtype::Float32 => None,
                _ => Some(crate::quant::QuantParams { scale: 1.0, min: 0.0 }),
            },
        }
    }

    fn group(paths: Vec<&str>, weights: Vec<WeightEntry>) -> WeightGroup {
        WeightGroup {
            paths: paths.into_iter().map(String::from).collect(),
            weights,
        }
    }

    #[test]
    fn test_spans_single_shard() {
        let g = group(
            vec!["s1"],
            vec![
                entry("a", vec![2], Dtype::Float32),
                entry("b", vec![3], Dtype::Uint8),
            ],
        );
        let spans = compute_spans(&g, &[11]).unwrap();
        assert_eq!(spans[0], Span { shard: 0, offset: 0, len: 8 });
        assert_eq!(spans[1], Span { shard: 0, offset: 8, len: 3 });
    }

    #[test]
    fn test_spans_across_shards() {
        let g = group(
            vec!["s1", "s2"],
            vec![
                entry("a", vec![2], Dtype::Float32),
                entry("b", vec![2], Dtype::Float32),
            ],
        );
        let spans = compute_spans(&g, &[8, 8]).unwrap();
        assert_eq!(spans[1], Span { shard: 1, offset: 0, len: 8 });
    }

    #[test]
    fn test_spans_truncated() {
        let g = group(vec!["s1"], vec![entry("a", vec![4], Dtype::Float32)]);
        let err = compute_spans(&g, &[8]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedBlob { .. }));
    }

    #[test]
    fn test_spans_boundary_straddle() {
        // 12 bytes pedidos con shards de 8+8: cruzaría la frontera
        let g = group(
            vec!["s1", "s2"],
            vec![
                entry("a", vec![1], Dtype::Float32),
                entry("b", vec![2], Dtype::Float32),
            ],
        );
        let err = compute_spans(&g, &[8, 8]).unwrap_err();
        assert!(matches!(err, CodecError::ManifestMalformed(_)));
    }
}
