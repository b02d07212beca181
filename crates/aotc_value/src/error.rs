use thiserror::Error;

use crate::tensor::Device;

/// Failure raised while running a user function or a compiled artifact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("cannot broadcast shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("tensors live on different devices ({lhs} vs {rhs})")]
    DeviceMismatch { lhs: Device, rhs: Device },
    #[error("tensor of shape {shape:?} needs {expected} elements, got {actual}")]
    StorageMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("argument {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0}")]
    Custom(String),
}

impl CallError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}
