// src/artifact/writer.rs
// ============================================================================
// ARTIFACT WRITER - Acumula shards y arma el manifest final
// ============================================================================
//
// Los payloads se concatenan en orden de manifest. Política de sharding:
// si añadir un entry supera el umbral y el shard actual no está vacío, se
// cierra y se abre uno nuevo. Un entry nunca se parte entre dos shards;
// un entry que solo él supera el umbral ocupa su propio shard.
//
// Nombres de shard según la convención del conversor de TF.js:
// group1-shard{i}of{n}.bin (1-based).
//
// ============================================================================

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{CodecError, Result};
use crate::manifest::{Manifest, WeightEntry, WeightGroup, FORMAT_LAYERS_MODEL};

/// Umbral por defecto: 4 MiB por shard, como el conversor original.
pub const DEFAULT_SHARD_BYTES: u64 = 4 * 1024 * 1024;

/// Nombre del manifest dentro del directorio de salida.
pub const MANIFEST_FILE: &str = "model.json";

fn shard_name(index: usize, total: usize) -> String {
    format!("group1-shard{}of{}.bin", index + 1, total)
}

/// Acumula payloads por entry y produce el [`Artifact`] en memoria.
pub struct ArtifactWriter {
    max_shard_bytes: u64,
    shards: Vec<Vec<u8>>,
    entries: Vec<WeightEntry>,
    total_bytes: u64,
}

impl ArtifactWriter {
    pub fn new(max_shard_bytes: u64) -> Self {
        Self {
            // umbral 0 degeneraría en un shard por entry vacío tras vacío
            max_shard_bytes: max_shard_bytes.max(1),
            shards: vec![Vec::new()],
            entries: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Añade un entry con su payload ya cuantizado, en orden de manifest.
    pub fn append(&mut self, entry: WeightEntry, payload: &[u8]) -> Result<()> {
        if payload.len() as u64 != entry.byte_len() {
            return Err(CodecError::SizeMismatch {
                group: 0,
                expected: entry.byte_len(),
                actual: payload.len() as u64,
            });
        }

        let current = self.shards.last().expect("writer always holds a shard");
        if !current.is_empty()
            && current.len() as u64 + payload.len() as u64 > self.max_shard_bytes
        {
            debug!(
                "shard {} closed at {} bytes, opening next",
                self.shards.len(),
                current.len()
            );
            self.shards.push(Vec::new());
        }

        self.shards
            .last_mut()
            .expect("writer always holds a shard")
            .extend_from_slice(payload);
        self.total_bytes += payload.len() as u64;
        self.entries.push(entry);

        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Cierra el grupo y produce manifest + shards.
    pub fn finalize(
        mut self,
        model_topology: serde_json::Value,
        generated_by: String,
        converted_by: String,
    ) -> Artifact {
        // sin entries no hay shard que emitir
        if self.entries.is_empty() {
            self.shards.clear();
        }

        let total = self.shards.len();
        let named: Vec<(String, Vec<u8>)> = self
            .shards
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| (shard_name(i, total), bytes))
            .collect();

        let manifest = Manifest {
            format: FORMAT_LAYERS_MODEL.to_string(),
            generated_by,
            converted_by,
            model_topology,
            weights_manifest: vec![WeightGroup {
                paths: named.iter().map(|(name, _)| name.clone()).collect(),
                weights: self.entries,
            }],
        };

        Artifact {
            manifest,
            shards: named,
        }
    }
}

/// Artefacto completo en memoria: manifest + shards con nombre.
#[derive(Debug)]
pub struct Artifact {
    pub manifest: Manifest,
    pub shards: Vec<(String, Vec<u8>)>,
}

impl Artifact {
    /// Bytes totales de blob a través de todos los shards.
    pub fn total_blob_bytes(&self) -> u64 {
        self.shards.iter().map(|(_, b)| b.len() as u64).sum()
    }

    /// Persiste manifest + shards en `dir`.
    ///
    /// Todo-o-nada: si cualquier escritura falla, los archivos ya escritos
    /// se eliminan antes de propagar el error. No quedan artefactos que
    /// parezcan completos sin serlo.
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written: Vec<PathBuf> = Vec::new();
        let result = self.persist_inner(dir, &mut written);

        if result.is_err() {
            for path in &written {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("cleanup of {} failed: {}", path.display(), e);
                }
            }
        }

        result
    }

    fn persist_inner(&self, dir: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = self.manifest.to_json_bytes()?;

        let file = fs::File::create(&manifest_path)?;
        written.push(manifest_path);
        let mut w = BufWriter::new(file);
        w.write_all(&manifest_bytes)?;
        w.flush()?;

        for (name, bytes) in &self.shards {
            let path = dir.join(name);
            let file = fs::File::create(&path)?;
            written.push(path);
            let mut w = BufWriter::new(file);
            w.write_all(bytes)?;
            w.flush()?;
        }

        info!(
            "artifact persisted: {} + {} shard(s), {} blob bytes",
            MANIFEST_FILE,
            self.shards.len(),
            self.total_blob_bytes()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Dtype;
    use serde_json::json;

    fn f32_entry(name: &str, shape: Vec<usize>) -> WeightEntry {
        WeightEntry {
            name: name.to_string(),
            shape,
            dtype: Dtype::Float32,
            quant: None,
        }
    }

    #[test]
    fn test_single_entry_single_shard() {
        // ("w", [2,2], float32) → blob de 16 bytes en un shard
        let mut writer = ArtifactWriter::new(DEFAULT_SHARD_BYTES);
        writer
            .append(f32_entry("w", vec![2, 2]), &[0u8; 16])
            .unwrap();

        let artifact = writer.finalize(json!({}), "g".into(), "c".into());
        assert_eq!(artifact.shards.len(), 1);
        assert_eq!(artifact.shards[0].0, "group1-shard1of1.bin");
        assert_eq!(artifact.shards[0].1.len(), 16);

        let group = &artifact.manifest.weights_manifest[0];
        assert_eq!(group.paths, vec!["group1-shard1of1.bin"]);
        assert_eq!(group.weights[0].name, "w");
        assert_eq!(group.weights[0].shape, vec![2, 2]);
    }

    #[test]
    fn test_sharding_threshold() {
        // umbral 10, dos entries de 8 bytes → dos shards enteros
        let mut writer = ArtifactWriter::new(10);
        writer.append(f32_entry("a", vec![2]), &[1u8; 8]).unwrap();
        writer.append(f32_entry("b", vec![2]), &[2u8; 8]).unwrap();

        let artifact = writer.finalize(json!({}), "g".into(), "c".into());
        assert_eq!(artifact.shards.len(), 2);
        assert_eq!(artifact.shards[0].0, "group1-shard1of2.bin");
        assert_eq!(artifact.shards[1].0, "group1-shard2of2.bin");
        assert_eq!(artifact.shards[0].1, vec![1u8; 8]);
        assert_eq!(artifact.shards[1].1, vec![2u8; 8]);
        assert_eq!(
            artifact.manifest.weights_manifest[0].paths,
            vec!["group1-shard1of2.bin", "group1-shard2of2.bin"]
        );
    }

    #[test]
    fn test_oversized_entry_own_shard() {
        // un entry mayor al umbral ocupa su propio shard, nunca se parte
        let mut writer = ArtifactWriter::new(10);
        writer.append(f32_entry("small", vec![1]), &[0u8; 4]).unwrap();
        writer.append(f32_entry("big", vec![8]), &[1u8; 32]).unwrap();
        writer.append(f32_entry("tail", vec![1]), &[2u8; 4]).unwrap();

        let artifact = writer.finalize(json!({}), "g".into(), "c".into());
        assert_eq!(artifact.shards.len(), 3);
        assert_eq!(artifact.shards[1].1.len(), 32);
        assert_eq!(artifact.shards[2].1.len(), 4);
    }

    #[test]
    fn test_entries_fill_shard_exactly() {
        // 8 + 2 = 10 == umbral: caben juntos
        let mut writer = ArtifactWriter::new(10);
        writer.append(f32_entry("a", vec![2]), &[1u8; 8]).unwrap();
        writer
            .append(
                WeightEntry {
                    name: "b".to_string(),
                    shape: vec![2],
                    dtype: Dtype::Uint8,
                    quant: Some(crate::quant::QuantParams { scale: 1.0, min: 0.0 }),
                },
                &[3u8; 2],
            )
            .unwrap();

        let artifact = writer.finalize(json!({}), "g".into(), "c".into());
        assert_eq!(artifact.shards.len(), 1);
        assert_eq!(artifact.shards[0].1.len(), 10);
    }

    #[test]
    fn test_payload_length_guard() {
        let mut writer = ArtifactWriter::new(DEFAULT_SHARD_BYTES);
        let err = writer
            .append(f32_entry("w", vec![2, 2]), &[0u8; 15])
            .unwrap_err();
        assert!(matches!(err, CodecError::SizeMismatch { .. }));
    }

    #[test]
    fn test_empty_writer_no_shards() {
        let writer = ArtifactWriter::new(DEFAULT_SHARD_BYTES);
        let artifact = writer.finalize(json!({}), "g".into(), "c".into());
        assert!(artifact.shards.is_empty());
        assert!(artifact.manifest.weights_manifest[0].paths.is_empty());
    }

    #[test]
    fn test_persist_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(10);
        writer.append(f32_entry("a", vec![2]), &[1u8; 8]).unwrap();
        writer.append(f32_entry("b", vec![2]), &[2u8; 8]).unwrap();

        let artifact = writer.finalize(json!({"x": 1}), "g".into(), "c".into());
        artifact.persist(dir.path()).unwrap();

        assert!(dir.path().join("model.json").exists());
        assert!(dir.path().join("group1-shard1of2.bin").exists());
        assert!(dir.path().join("group1-shard2of2.bin").exists());

        let blob = fs::read(dir.path().join("group1-shard1of2.bin")).unwrap();
        assert_eq!(blob, vec![1u8; 8]);
    }

    #[test]
    fn test_persist_cleanup_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(DEFAULT_SHARD_BYTES);
        writer.append(f32_entry("a", vec![2]), &[1u8; 8]).unwrap();
        let artifact = writer.finalize(json!({}), "g".into(), "c".into());

        // el nombre del shard ya existe como directorio → File::create falla
        fs::create_dir(dir.path().join("group1-shard1of1.bin")).unwrap();
        assert!(artifact.persist(dir.path()).is_err());

        // el manifest escrito antes del fallo fue eliminado
        assert!(!dir.path().join("model.json").exists());
    }
}
