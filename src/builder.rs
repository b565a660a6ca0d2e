// src/builder.rs
// ============================================================================
// BUILDER - Orquestador de conversión
// ============================================================================
//
// El builder es TONTO:
// - NO decide el esquema (lo elige el caller)
// - NO toca el filesystem (el Artifact se persiste aparte)
// - Solo valida, cuantiza, acumula
//
// Cualquier error de codificación aborta: no se finaliza nada y ningún
// archivo llega a disco.
//
// ============================================================================

use log::info;

use crate::artifact::{Artifact, ArtifactWriter, DEFAULT_SHARD_BYTES};
use crate::error::Result;
use crate::manifest::{Dtype, WeightEntry};
use crate::quant::{self, QuantScheme};
use crate::tensor::TensorSource;

/// Identificación de este conversor, emitida en `convertedBy`.
pub const CONVERTER_ID: &str = concat!("tfjs-convert ", env!("CARGO_PKG_VERSION"));

/// Opciones de una corrida de conversión.
///
/// Toda la configuración viaja explícita; el codec no lee estado global.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub scheme: QuantScheme,
    pub max_shard_bytes: u64,
    /// `generatedBy` del manifest; por defecto la identificación propia.
    pub generated_by: Option<String>,
    /// `convertedBy` del manifest; por defecto la identificación propia.
    pub converted_by: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            scheme: QuantScheme::None,
            max_shard_bytes: DEFAULT_SHARD_BYTES,
            generated_by: None,
            converted_by: None,
        }
    }
}

/// Estadísticas de conversión
#[derive(Debug, Default)]
pub struct BuildStats {
    pub float32_count: usize,
    pub uint8_count: usize,
    pub uint16_count: usize,
    pub total_bytes: u64,
    pub shard_count: usize,
}

impl BuildStats {
    pub fn total_tensors(&self) -> usize {
        self.float32_count + self.uint8_count + self.uint16_count
    }

    fn record(&mut self, dtype: Dtype, size: usize) {
        match dtype {
            Dtype::Float32 => self.float32_count += 1,
            Dtype::Uint8 => self.uint8_count += 1,
            Dtype::Uint16 => self.uint16_count += 1,
        }
        self.total_bytes += size as u64;
    }
}

/// Convierte la fuente completa en un [`Artifact`] en memoria.
pub fn convert(source: &dyn TensorSource, options: &ConvertOptions) -> Result<(Artifact, BuildStats)> {
    convert_with_progress(source, options, &mut |_, _, _| {})
}

/// Como [`convert`], notificando `(índice, total, nombre)` por tensor.
pub fn convert_with_progress(
    source: &dyn TensorSource,
    options: &ConvertOptions,
    progress: &mut dyn FnMut(usize, usize, &str),
) -> Result<(Artifact, BuildStats)> {
    let topology = source.topology()?;
    let tensors = source.tensors()?;

    info!(
        "converting {} tensors, scheme={}, shard threshold {} bytes",
        tensors.len(),
        options.scheme,
        options.max_shard_bytes
    );

    let mut writer = ArtifactWriter::new(options.max_shard_bytes);
    let mut stats = BuildStats::default();
    let total = tensors.len();

    for (idx, tensor) in tensors.iter().enumerate() {
        tensor.check_shape()?;
        if options.scheme != QuantScheme::None {
            // NaN/Inf envenenarían min/max; en passthrough son bytes válidos
            tensor.check_finite()?;
        }

        let quantized = quant::quantize(&tensor.values, options.scheme);
        let entry = WeightEntry {
            name: tensor.name.clone(),
            shape: tensor.shape.clone(),
            dtype: quantized.dtype,
            quant: quantized.params,
        };

        stats.record(quantized.dtype, quantized.bytes.len());
        writer.append(entry, &quantized.bytes)?;

        progress(idx + 1, total, &tensor.name);
    }

    let generated_by = options
        .generated_by
        .clone()
        .unwrap_or_else(|| CONVERTER_ID.to_string());
    let converted_by = options
        .converted_by
        .clone()
        .unwrap_or_else(|| CONVERTER_ID.to_string());

    let artifact = writer.finalize(topology, generated_by, converted_by);
    stats.shard_count = artifact.shards.len();

    Ok((artifact, stats))
}
