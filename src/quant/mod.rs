// src/quant/mod.rs
// ============================================================================
// QUANT - Cuantización afín min/max (uint8 / uint16)
// ============================================================================
//
// Cada tensor se cuantiza completo con un único par {scale, min}:
//   code  = round((v - min) / scale)  clamped a [0, 2^b - 1]
//   v'    = code * scale + min
//
// El error de reconstrucción queda acotado por scale/2 salvo donde hubo
// clamping. {scale, min} viajan en el manifest: sin ellos ningún lector
// independiente puede reconstruir.
//
// ============================================================================

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::manifest::Dtype;

/// Umbral de elementos a partir del cual el encode va en paralelo.
const PAR_THRESHOLD: usize = 64 * 1024;

/// Esquema de cuantización
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantScheme {
    #[default]
    None,
    Uint8,
    Uint16,
}

impl QuantScheme {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "float32" | "f32" => Some(Self::None),
            // el conversor original exponía quantization_bytes 1|2
            "uint8" | "u8" | "1" => Some(Self::Uint8),
            "uint16" | "u16" | "2" => Some(Self::Uint16),
            _ => None,
        }
    }

    /// Como `from_str` pero con error tipado para la capa de librería.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| CodecError::UnknownQuantScheme(s.to_string()))
    }

    /// Dtype con el que se persisten los códigos.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::None => Dtype::Float32,
            Self::Uint8 => Dtype::Uint8,
            Self::Uint16 => Dtype::Uint16,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Self::None => 32,
            Self::Uint8 => 8,
            Self::Uint16 => 16,
        }
    }

    /// Código máximo representable (2^b - 1), 0 para passthrough.
    fn max_code(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Uint8 => u8::MAX as f32,
            Self::Uint16 => u16::MAX as f32,
        }
    }

    /// Bytes que ocuparán `numel` elementos una vez cuantizados.
    pub fn size_for(&self, numel: usize) -> usize {
        numel * self.dtype().size_bytes()
    }
}

impl std::fmt::Display for QuantScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Uint8 => write!(f, "uint8"),
            Self::Uint16 => write!(f, "uint16"),
        }
    }
}

/// Parámetros de reconstrucción persistidos en el manifest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub min: f32,
}

/// Resultado de cuantizar un tensor
#[derive(Debug, Clone)]
pub struct Quantized {
    pub bytes: Vec<u8>,
    pub dtype: Dtype,
    pub params: Option<QuantParams>,
}

fn min_max(values: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;

    for &val in values {
        if val < min {
            min = val;
        }
        if val > max {
            max = val;
        }
    }

    (min, max)
}

/// Cuantiza valores según el esquema indicado.
///
/// `None` es passthrough: los valores se empaquetan como float32 LE y no
/// hay parámetros. Los esquemas enteros devuelven códigos + {scale, min}.
pub fn quantize(values: &[f32], scheme: QuantScheme) -> Quantized {
    if scheme == QuantScheme::None {
        return Quantized {
            bytes: crate::tensor::to_le_bytes(values),
            dtype: Dtype::Float32,
            params: None,
        };
    }

    let (min, max) = min_max(values);

    // Tensor constante (o vacío): scale forzado a 1.0, todos los códigos 0
    let scale = if values.is_empty() || max == min {
        1.0
    } else {
        (max - min) / scheme.max_code()
    };
    let min = if values.is_empty() { 0.0 } else { min };

    let max_code = scheme.max_code();
    let encode = |v: f32| ((v - min) / scale).round().clamp(0.0, max_code);

    let bytes = match scheme {
        QuantScheme::Uint8 => {
            if values.len() >= PAR_THRESHOLD {
                values.par_iter().map(|&v| encode(v) as u8).collect()
            } else {
                values.iter().map(|&v| encode(v) as u8).collect()
            }
        }
        QuantScheme::Uint16 => {
            let codes: Vec<u16> = if values.len() >= PAR_THRESHOLD {
                values.par_iter().map(|&v| encode(v) as u16).collect()
            } else {
                values.iter().map(|&v| encode(v) as u16).collect()
            };
            let mut buf = Vec::with_capacity(codes.len() * 2);
            for c in codes {
                buf.write_u16::<LittleEndian>(c).unwrap();
            }
            buf
        }
        QuantScheme::None => unreachable!(),
    };

    Quantized {
        bytes,
        dtype: scheme.dtype(),
        params: Some(QuantParams { scale, min }),
    }
}

/// Reconstruye valores f32 desde bytes empaquetados.
///
/// Para dtypes enteros los parámetros son obligatorios: sin {scale, min}
/// la reconstrucción es imposible.
pub fn dequantize(data: &[u8], dtype: Dtype, params: Option<&QuantParams>) -> Result<Vec<f32>> {
    match dtype {
        Dtype::Float32 => Ok(crate::tensor::from_le_bytes(data)),
        Dtype::Uint8 => {
            let p = params.ok_or_else(|| {
                CodecError::ManifestMalformed("uint8 entry without quant params".to_string())
            })?;
            Ok(data.iter().map(|&c| c as f32 * p.scale + p.min).collect())
        }
        Dtype::Uint16 => {
            let p = params.ok_or_else(|| {
                CodecError::ManifestMalformed("uint16 entry without quant params".to_string())
            })?;
            Ok(data
                .chunks_exact(2)
                .map(|chunk| LittleEndian::read_u16(chunk) as f32 * p.scale + p.min)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(QuantScheme::from_str("none"), Some(QuantScheme::None));
        assert_eq!(QuantScheme::from_str("UINT8"), Some(QuantScheme::Uint8));
        assert_eq!(QuantScheme::from_str("u16"), Some(QuantScheme::Uint16));
        assert_eq!(QuantScheme::from_str("1"), Some(QuantScheme::Uint8));
        assert_eq!(QuantScheme::from_str("int4"), None);
    }

    #[test]
    fn test_parse_unknown() {
        let err = QuantScheme::parse("int4").unwrap_err();
        assert!(matches!(err, CodecError::UnknownQuantScheme(_)));
    }

    #[test]
    fn test_passthrough() {
        let q = quantize(&[1.0, 2.0, 3.0, 4.0], QuantScheme::None);
        assert_eq!(q.dtype, Dtype::Float32);
        assert_eq!(q.bytes.len(), 16);
        assert!(q.params.is_none());

        let back = dequantize(&q.bytes, q.dtype, None).unwrap();
        assert_eq!(back, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_uint8_known_codes() {
        // [0,1,2,3] → min=0, scale=3/255, codes [0,85,170,255]
        let q = quantize(&[0.0, 1.0, 2.0, 3.0], QuantScheme::Uint8);
        let p = q.params.unwrap();
        assert_eq!(p.min, 0.0);
        assert!((p.scale - 3.0 / 255.0).abs() < 1e-7);
        assert_eq!(q.bytes, vec![0, 85, 170, 255]);

        let back = dequantize(&q.bytes, q.dtype, Some(&p)).unwrap();
        for (orig, rec) in [0.0f32, 1.0, 2.0, 3.0].iter().zip(&back) {
            assert!((orig - rec).abs() < 0.006);
        }
    }

    #[test]
    fn test_uint16_roundtrip_bound() {
        let values: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.37).sin()).collect();
        let q = quantize(&values, QuantScheme::Uint16);
        let p = q.params.unwrap();
        assert_eq!(q.bytes.len(), values.len() * 2);

        let back = dequantize(&q.bytes, q.dtype, Some(&p)).unwrap();
        let bound = p.scale / 2.0 + 1e-6;
        for (orig, rec) in values.iter().zip(&back) {
            assert!((orig - rec).abs() <= bound, "{} vs {}", orig, rec);
        }
    }

    #[test]
    fn test_uint8_roundtrip_bound() {
        let values: Vec<f32> = (0..500).map(|i| (i as f32 * 0.11).cos() * 3.0).collect();
        let q = quantize(&values, QuantScheme::Uint8);
        let p = q.params.unwrap();

        let back = dequantize(&q.bytes, q.dtype, Some(&p)).unwrap();
        let bound = p.scale / 2.0 + 1e-6;
        for (orig, rec) in values.iter().zip(&back) {
            assert!((orig - rec).abs() <= bound);
        }
    }

    #[test]
    fn test_constant_tensor() {
        // max == min: scale forzado a 1.0 para no dividir por cero
        let q = quantize(&[0.5, 0.5, 0.5], QuantScheme::Uint8);
        let p = q.params.unwrap();
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.min, 0.5);
        assert_eq!(q.bytes, vec![0, 0, 0]);

        let back = dequantize(&q.bytes, q.dtype, Some(&p)).unwrap();
        assert_eq!(back, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_empty_tensor() {
        let q = quantize(&[], QuantScheme::Uint8);
        assert!(q.bytes.is_empty());
        let p = q.params.unwrap();
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.min, 0.0);
    }

    #[test]
    fn test_dequantize_requires_params() {
        let err = dequantize(&[0, 1, 2], Dtype::Uint8, None).unwrap_err();
        assert!(matches!(err, CodecError::ManifestMalformed(_)));
    }

    #[test]
    fn test_negative_range() {
        let values = vec![-2.0f32, -1.0, 0.0, 1.0, 2.0];
        let q = quantize(&values, QuantScheme::Uint8);
        let p = q.params.unwrap();
        assert_eq!(p.min, -2.0);
        assert_eq!(q.bytes[0], 0);
        assert_eq!(q.bytes[4], 255);
    }

    #[test]
    fn test_size_for() {
        assert_eq!(QuantScheme::None.size_for(10), 40);
        assert_eq!(QuantScheme::Uint16.size_for(10), 20);
        assert_eq!(QuantScheme::Uint8.size_for(10), 10);
    }
}
