//! Call-argument model shared by the compilation cache.
//!
//! A call is an ordered list of [`ArgValue`]s: tensors, which are keyed by
//! their metadata only, and opaque values, which are keyed by their own
//! equality and hash.

pub mod error;
pub mod opaque;
pub mod tensor;
pub mod value;

pub use error::CallError;
pub use opaque::{OpaqueObject, OpaqueValue};
pub use tensor::{DType, Device, Tensor, TensorMeta};
pub use value::{ArgValue, ArgsExt};
