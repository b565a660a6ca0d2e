// src/error.rs
// ============================================================================
// CODEC ERRORS - Taxonomía de fallos del codec
// ============================================================================

use thiserror::Error;

/// Fallos del codec de artefactos.
///
/// Los errores de codificación (shape, dtype, scheme) abortan la conversión
/// inmediatamente; el validador en cambio los acumula en un
/// [`crate::artifact::ValidationReport`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// product(shape) no coincide con la cantidad de valores
    #[error("tensor '{name}': shape {shape:?} implies {expected} elements, got {count}")]
    ShapeMismatch {
        name: String,
        shape: Vec<usize>,
        expected: usize,
        count: usize,
    },

    #[error("unknown dtype '{0}' (expected float32, uint8 or uint16)")]
    UnknownDtype(String),

    #[error("unknown quantization scheme '{0}' (expected none, uint8 or uint16)")]
    UnknownQuantScheme(String),

    /// NaN/Inf en los valores: min/max quedarían envenenados
    #[error("tensor '{name}' contains non-finite values")]
    NonFiniteValue { name: String },

    #[error("malformed manifest: {0}")]
    ManifestMalformed(String),

    #[error("weight group {group}: manifest expects {expected} bytes but shards hold {actual}")]
    SizeMismatch {
        group: usize,
        expected: u64,
        actual: u64,
    },

    #[error("entry '{name}': bytes {offset}..{end} exceed {available} available bytes", end = .offset + .size)]
    TruncatedBlob {
        name: String,
        offset: u64,
        size: u64,
        available: u64,
    },

    #[error("duplicate tensor name '{0}' in manifest")]
    DuplicateTensor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::ManifestMalformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
