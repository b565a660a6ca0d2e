// src/manifest/mod.rs
// ============================================================================
// MANIFEST - Modelo tipado de model.json (layers-model)
// ============================================================================
//
// El manifest describe topología + layout de pesos:
//
//   {
//     "format": "layers-model",
//     "generatedBy": "...", "convertedBy": "...",
//     "modelTopology": { ... },          ← árbol opaco, se copia tal cual
//     "weightsManifest": [
//       { "paths": ["group1-shard1of1.bin"],
//         "weights": [ { "name", "shape", "dtype", "quant"? } ] }
//     ]
//   }
//
// La serialización es determinista: orden de campos fijo por declaración y
// el árbol de topología conserva el orden de inserción de sus claves
// (serde_json con preserve_order). Mismo input ⇒ mismo texto, byte a byte.
//
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::quant::QuantParams;

/// Valor del campo `format` que emite este conversor.
pub const FORMAT_LAYERS_MODEL: &str = "layers-model";

/// Dtype de un entry de pesos en el manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Float32,
    Uint8,
    Uint16,
}

impl Dtype {
    /// Bytes por elemento: float32=4, uint16=2, uint8=1.
    pub fn size_bytes(self) -> usize {
        match self {
            Dtype::Float32 => 4,
            Dtype::Uint16 => 2,
            Dtype::Uint8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dtype::Float32 => "float32",
            Dtype::Uint8 => "uint8",
            Dtype::Uint16 => "uint16",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "float32" => Ok(Dtype::Float32),
            "uint8" => Ok(Dtype::Uint8),
            "uint16" => Ok(Dtype::Uint16),
            _ => Err(CodecError::UnknownDtype(s.to_string())),
        }
    }
}

/// Metadatos de un tensor dentro de un grupo de pesos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: Dtype,
    /// Presente solo si el entry está cuantizado.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quant: Option<QuantParams>,
}

impl WeightEntry {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Bytes que ocupa el entry dentro del blob.
    pub fn byte_len(&self) -> u64 {
        (self.numel() * self.dtype.size_bytes()) as u64
    }
}

/// Grupo de pesos: shards + entries en orden de concatenación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightEntry>,
}

impl WeightGroup {
    /// Suma de bytes esperados de todos los entries, en orden de manifest.
    pub fn expected_bytes(&self) -> u64 {
        self.weights.iter().map(|w| w.byte_len()).sum()
    }
}

/// model.json completo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    #[serde(rename = "generatedBy")]
    pub generated_by: String,
    #[serde(rename = "convertedBy")]
    pub converted_by: String,
    #[serde(rename = "modelTopology")]
    pub model_topology: serde_json::Value,
    #[serde(rename = "weightsManifest")]
    pub weights_manifest: Vec<WeightGroup>,
}

impl Manifest {
    /// Serializa a texto JSON determinista (indentación de 2 espacios).
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parsea y aplica los chequeos estructurales.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(data)?;
        manifest.check()?;
        Ok(manifest)
    }

    pub fn from_str(data: &str) -> Result<Self> {
        Self::from_slice(data.as_bytes())
    }

    /// Chequeos estructurales que serde no cubre.
    ///
    /// Primera inconsistencia encontrada ⇒ error. El validador de artefactos
    /// hace la pasada exhaustiva que acumula todos los problemas.
    pub fn check(&self) -> Result<()> {
        if self.format.is_empty() {
            return Err(CodecError::ManifestMalformed("empty 'format' field".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for (gi, group) in self.weights_manifest.iter().enumerate() {
            if group.paths.is_empty() && !group.weights.is_empty() {
                return Err(CodecError::ManifestMalformed(format!(
                    "weight group {} has entries but no paths",
                    gi
                )));
            }

            for entry in &group.weights {
                if !seen.insert(entry.name.as_str()) {
                    return Err(CodecError::DuplicateTensor(entry.name.clone()));
                }

                if entry.shape.iter().any(|&d| d == 0) {
                    return Err(CodecError::ManifestMalformed(format!(
                        "entry '{}' has a zero dimension in shape {:?}",
                        entry.name, entry.shape
                    )));
                }

                if entry.dtype != Dtype::Float32 && entry.quant.is_none() {
                    return Err(CodecError::ManifestMalformed(format!(
                        "entry '{}' is {} but carries no quant params",
                        entry.name,
                        entry.dtype.as_str()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Cantidad total de entries a través de todos los grupos.
    pub fn total_entries(&self) -> usize {
        self.weights_manifest.iter().map(|g| g.weights.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_manifest() -> Manifest {
        Manifest {
            format: FORMAT_LAYERS_MODEL.to_string(),
            generated_by: "keras v2.11.0".to_string(),
            converted_by: "tfjs-convert 0.1.0".to_string(),
            model_topology: json!({"class_name": "Sequential", "config": {"name": "m"}}),
            weights_manifest: vec![WeightGroup {
                paths: vec!["group1-shard1of1.bin".to_string()],
                weights: vec![WeightEntry {
                    name: "w".to_string(),
                    shape: vec![2, 2],
                    dtype: Dtype::Float32,
                    quant: None,
                }],
            }],
        }
    }

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(Dtype::Float32.size_bytes(), 4);
        assert_eq!(Dtype::Uint16.size_bytes(), 2);
        assert_eq!(Dtype::Uint8.size_bytes(), 1);
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!(Dtype::parse("float32").unwrap(), Dtype::Float32);
        assert_eq!(Dtype::parse("uint16").unwrap(), Dtype::Uint16);
        assert!(matches!(
            Dtype::parse("int8").unwrap_err(),
            CodecError::UnknownDtype(_)
        ));
    }

    #[test]
    fn test_serialization_field_order() {
        let json = sample_manifest().to_json_string().unwrap();
        let fmt = json.find("\"format\"").unwrap();
        let gen = json.find("\"generatedBy\"").unwrap();
        let conv = json.find("\"convertedBy\"").unwrap();
        let topo = json.find("\"modelTopology\"").unwrap();
        let wm = json.find("\"weightsManifest\"").unwrap();
        assert!(fmt < gen && gen < conv && conv < topo && topo < wm);
    }

    #[test]
    fn test_quant_omitted_when_absent() {
        let json = sample_manifest().to_json_string().unwrap();
        assert!(!json.contains("\"quant\""));
    }

    #[test]
    fn test_quant_serialized() {
        let mut m = sample_manifest();
        m.weights_manifest[0].weights[0].dtype = Dtype::Uint8;
        m.weights_manifest[0].weights[0].quant = Some(QuantParams {
            scale: 0.5,
            min: -1.0,
        });
        let json = m.to_json_string().unwrap();
        assert!(json.contains("\"quant\""));
        assert!(json.contains("\"scale\""));
        assert!(json.contains("\"min\""));
    }

    #[test]
    fn test_roundtrip() {
        let m = sample_manifest();
        let json = m.to_json_bytes().unwrap();
        let back = Manifest::from_slice(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_deterministic_text() {
        let a = sample_manifest().to_json_string().unwrap();
        let b = sample_manifest().to_json_string().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_topology_key_order_preserved() {
        // las claves de la topología no se reordenan
        let raw = r#"{"zebra": 1, "alpha": 2, "mid": 3}"#;
        let topo: serde_json::Value = serde_json::from_str(raw).unwrap();
        let mut m = sample_manifest();
        m.model_topology = topo;
        let json = m.to_json_string().unwrap();
        let z = json.find("\"zebra\"").unwrap();
        let a = json.find("\"alpha\"").unwrap();
        let mid = json.find("\"mid\"").unwrap();
        assert!(z < a && a < mid);
    }

    #[test]
    fn test_missing_required_key() {
        let err = Manifest::from_str(r#"{"format": "layers-model"}"#).unwrap_err();
        assert!(matches!(err, CodecError::ManifestMalformed(_)));
    }

    #[test]
    fn test_duplicate_entry_name() {
        let mut m = sample_manifest();
        let dup = m.weights_manifest[0].weights[0].clone();
        m.weights_manifest[0].weights.push(dup);
        assert!(matches!(
            m.check().unwrap_err(),
            CodecError::DuplicateTensor(_)
        ));
    }

    #[test]
    fn test_integer_dtype_requires_quant() {
        let mut m = sample_manifest();
        m.weights_manifest[0].weights[0].dtype = Dtype::Uint8;
        assert!(matches!(
            m.check().unwrap_err(),
            CodecError::ManifestMalformed(_)
        ));
    }

    #[test]
    fn test_expected_bytes() {
        let m = sample_manifest();
        // [2,2] float32 = 16 bytes
        assert_eq!(m.weights_manifest[0].expected_bytes(), 16);
    }
}
