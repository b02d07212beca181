use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// Element type tag. Storage is always `f64`; the tag only feeds signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    Bool,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(u16),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Everything about a tensor except its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub dtype: DType,
    pub device: Device,
    pub shape: Vec<usize>,
    pub requires_grad: bool,
}

impl TensorMeta {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Dense row-major tensor.
///
/// Storage is shared, so cloning a tensor is cheap and never copies data.
#[derive(Debug, Clone)]
pub struct Tensor {
    meta: TensorMeta,
    data: Arc<[f64]>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, CallError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(CallError::StorageMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            meta: TensorMeta {
                dtype: DType::F32,
                device: Device::Cpu,
                shape,
                requires_grad: false,
            },
            data: data.into(),
        })
    }

    pub fn full(shape: &[usize], value: f64) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            meta: TensorMeta {
                dtype: DType::F32,
                device: Device::Cpu,
                shape: shape.to_vec(),
                requires_grad: false,
            },
            data: vec![value; len].into(),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// `0, 1, 2, ...` laid out in row-major order.
    pub fn arange(shape: &[usize]) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            meta: TensorMeta {
                dtype: DType::F32,
                device: Device::Cpu,
                shape: shape.to_vec(),
                requires_grad: false,
            },
            data: (0..len).map(|i| i as f64).collect(),
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.meta.dtype = dtype;
        self
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.meta.device = device;
        self
    }

    pub fn requires_grad(mut self, requires_grad: bool) -> Self {
        self.meta.requires_grad = requires_grad;
        self
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    pub fn rank(&self) -> usize {
        self.meta.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn device(&self) -> Device {
        self.meta.device
    }

    pub fn is_requires_grad(&self) -> bool {
        self.meta.requires_grad
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            meta: self.meta.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map(|x| x * factor)
    }

    pub fn add(&self, other: &Tensor) -> Result<Self, CallError> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn mul(&self, other: &Tensor) -> Result<Self, CallError> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Elementwise binary op with trailing-axis broadcasting.
    pub fn zip_with(&self, other: &Tensor, f: impl Fn(f64, f64) -> f64) -> Result<Self, CallError> {
        if self.device() != other.device() {
            return Err(CallError::DeviceMismatch {
                lhs: self.device(),
                rhs: other.device(),
            });
        }

        let shape = broadcast_shape(self.shape(), other.shape()).ok_or_else(|| {
            CallError::ShapeMismatch {
                lhs: self.shape().to_vec(),
                rhs: other.shape().to_vec(),
            }
        })?;

        let len = shape.iter().product::<usize>();
        let data = (0..len)
            .map(|flat| {
                let a = self.data[source_index(&shape, flat, self.shape())];
                let b = other.data[source_index(&shape, flat, other.shape())];
                f(a, b)
            })
            .collect();

        Ok(Self {
            meta: TensorMeta {
                dtype: self.dtype().max(other.dtype()),
                device: self.device(),
                shape,
                requires_grad: self.is_requires_grad() || other.is_requires_grad(),
            },
            data,
        })
    }

    /// Elementwise comparison with a tolerance; shapes must match exactly.
    pub fn allclose(&self, other: &Tensor, tolerance: f64) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let lhs_offset = rank - lhs.len();
    let rhs_offset = rank - rhs.len();

    (0..rank)
        .map(|axis| {
            let a = if axis >= lhs_offset { lhs[axis - lhs_offset] } else { 1 };
            let b = if axis >= rhs_offset { rhs[axis - rhs_offset] } else { 1 };
            match (a, b) {
                (a, b) if a == b => Some(a),
                (1, b) => Some(b),
                (a, 1) => Some(a),
                _ => None,
            }
        })
        .collect()
}

// Maps a flat index in the broadcast output back into a source tensor.
fn source_index(out_shape: &[usize], flat: usize, src_shape: &[usize]) -> usize {
    let offset = out_shape.len() - src_shape.len();
    let mut remaining = flat;
    let mut index = 0;
    let mut stride = 1;

    for axis in (0..out_shape.len()).rev() {
        let coord = remaining % out_shape[axis];
        remaining /= out_shape[axis];
        if axis >= offset {
            let dim = src_shape[axis - offset];
            if dim != 1 {
                index += coord * stride;
            }
            stride *= dim;
        }
    }

    index
}
