// src/tensor.rs
// ============================================================================
// TENSOR - Tensores fuente y empaquetado row-major little-endian
// ============================================================================

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{CodecError, Result};

/// Un tensor con nombre tal como lo entrega la fuente del modelo.
///
/// Los valores llegan ya aplanados en orden row-major; `shape` solo
/// describe cómo reinterpretarlos.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl Tensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            values,
        }
    }

    /// Número de elementos según el shape. Shape vacío = escalar (1).
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Verifica que shape y cantidad de valores coincidan.
    ///
    /// Dimensiones cero se rechazan: el manifest exige enteros positivos.
    pub fn check_shape(&self) -> Result<()> {
        if self.shape.iter().any(|&d| d == 0) {
            return Err(CodecError::ShapeMismatch {
                name: self.name.clone(),
                shape: self.shape.clone(),
                expected: 0,
                count: self.values.len(),
            });
        }

        let expected = self.numel();
        if expected != self.values.len() {
            return Err(CodecError::ShapeMismatch {
                name: self.name.clone(),
                shape: self.shape.clone(),
                expected,
                count: self.values.len(),
            });
        }

        Ok(())
    }

    /// Verifica que todos los valores sean finitos.
    pub fn check_finite(&self) -> Result<()> {
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(CodecError::NonFiniteValue {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Empaqueta valores f32 a bytes little-endian, 4 bytes por valor.
pub fn to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for &v in values {
        // Vec<u8> nunca falla al escribir
        buf.write_f32::<LittleEndian>(v).unwrap();
    }
    buf
}

/// Desempaqueta bytes little-endian a f32.
pub fn from_le_bytes(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(LittleEndian::read_f32)
        .collect()
}

/// Fuente de tensores inyectada al codec.
///
/// El codec nunca carga formatos nativos por su cuenta: la fuente entrega
/// la topología opaca y la lista ordenada de tensores.
pub trait TensorSource {
    /// Topología del modelo, copiada sin interpretar al manifest.
    fn topology(&self) -> Result<serde_json::Value>;

    /// Tensores en el orden en que deben aparecer en el manifest.
    fn tensors(&self) -> Result<Vec<Tensor>>;
}

/// Fuente en memoria para uso de librería y tests.
pub struct VecSource {
    pub topology: serde_json::Value,
    pub tensors: Vec<Tensor>,
}

impl VecSource {
    pub fn new(topology: serde_json::Value, tensors: Vec<Tensor>) -> Self {
        Self { topology, tensors }
    }
}

impl TensorSource for VecSource {
    fn topology(&self) -> Result<serde_json::Value> {
        Ok(self.topology.clone())
    }

    fn tensors(&self) -> Result<Vec<Tensor>> {
        Ok(self.tensors.clone())
    }
}
