//! Ahead-of-time compilation cache.
//!
//! A [`Dispatch`] stands in for a user function: each call is fingerprinted
//! by a [`HasherStrategy`], looked up in that function's cache inside a
//! [`CacheRegistry`], and compiled by a [`Compiler`] only on a miss.

pub mod cli;
pub mod config;
pub mod error;
pub mod jit;

pub use aotc_value::{ArgValue, ArgsExt, CallError, DType, Device, OpaqueValue, Tensor};
pub use config::{CompileConfig, ConfigError};
pub use error::CacheError;
pub use jit::{
    CacheRegistry, Compiler, Dispatch, HasherStrategy, UserFunction, aot_function,
    clear_compile_cache, jit, num_of_recompilations,
};
