use std::sync::Arc;

use crate::error::CallError;
use crate::opaque::{OpaqueObject, OpaqueValue};
use crate::tensor::Tensor;

/// One positional argument of a call.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Tensor(Tensor),
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Vec<ArgValue>),
    Custom(OpaqueValue),
    Object(OpaqueObject),
}

impl ArgValue {
    pub fn custom<T>(value: T) -> Self
    where
        T: Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Custom(OpaqueValue::new(value))
    }

    pub fn object<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Self::Object(OpaqueObject::new(value))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "tensor",
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::Custom(_) => "custom",
            Self::Object(_) => "object",
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Numeric view of `Int`, `Float` and `Bool` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(value) => Some(f64::from(u8::from(*value))),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn downcast_custom<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref::<T>(),
            Self::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Positional accessors used by user functions to unpack their arguments.
pub trait ArgsExt {
    fn expect_arity(&self, expected: usize) -> Result<(), CallError>;
    fn tensor(&self, index: usize) -> Result<&Tensor, CallError>;
    fn number(&self, index: usize) -> Result<f64, CallError>;
    fn flag(&self, index: usize) -> Result<bool, CallError>;
}

impl ArgsExt for [ArgValue] {
    fn expect_arity(&self, expected: usize) -> Result<(), CallError> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(CallError::ArityMismatch {
                expected,
                actual: self.len(),
            })
        }
    }

    fn tensor(&self, index: usize) -> Result<&Tensor, CallError> {
        let arg = self.get(index).ok_or(CallError::ArityMismatch {
            expected: index + 1,
            actual: self.len(),
        })?;
        arg.as_tensor().ok_or(CallError::TypeMismatch {
            index,
            expected: "tensor",
            found: arg.kind_name(),
        })
    }

    fn number(&self, index: usize) -> Result<f64, CallError> {
        let arg = self.get(index).ok_or(CallError::ArityMismatch {
            expected: index + 1,
            actual: self.len(),
        })?;
        arg.as_f64().ok_or(CallError::TypeMismatch {
            index,
            expected: "number",
            found: arg.kind_name(),
        })
    }

    fn flag(&self, index: usize) -> Result<bool, CallError> {
        let arg = self.get(index).ok_or(CallError::ArityMismatch {
            expected: index + 1,
            actual: self.len(),
        })?;
        arg.as_bool().ok_or(CallError::TypeMismatch {
            index,
            expected: "bool",
            found: arg.kind_name(),
        })
    }
}

impl From<Tensor> for ArgValue {
    fn from(tensor: Tensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<OpaqueValue> for ArgValue {
    fn from(value: OpaqueValue) -> Self {
        Self::Custom(value)
    }
}

impl From<Vec<ArgValue>> for ArgValue {
    fn from(values: Vec<ArgValue>) -> Self {
        Self::Tuple(values)
    }
}
