// src/lib.rs
// ============================================================================
// TFJS-CONVERT - Codec de artefactos layers-model (model.json + shards)
// ============================================================================

pub mod artifact;
pub mod builder;
pub mod error;
pub mod manifest;
pub mod quant;
pub mod tensor;

// Re-exports principales
pub use artifact::{validate_path, Artifact, ArtifactReader, ArtifactWriter, ValidationReport};
pub use builder::{convert, convert_with_progress, BuildStats, ConvertOptions, CONVERTER_ID};
pub use error::{CodecError, Result};
pub use manifest::{Dtype, Manifest, WeightEntry, WeightGroup};
pub use quant::{dequantize, quantize, QuantParams, QuantScheme};
pub use tensor::{Tensor, TensorSource, VecSource};
