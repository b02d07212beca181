use aotc_value::CallError;
use thiserror::Error;

use crate::jit::compiler::CompileError;

/// Errors surfaced to the caller of a [`Dispatch`](crate::jit::Dispatch).
///
/// Nothing in the cache retries or swallows these; a failed compile leaves
/// no entry behind.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("argument {index} of type `{type_name}` has no usable equality/hash contract")]
    UnhashableArgument {
        index: usize,
        type_name: &'static str,
    },
    #[error("backend `{backend}` failed to compile `{function}`")]
    CompilationFailure {
        backend: String,
        function: String,
        #[source]
        source: CompileError,
    },
    #[error("no compiler registered for backend `{name}`")]
    UnknownBackend { name: String },
    #[error(transparent)]
    Invocation(#[from] CallError),
}

impl CacheError {
    pub fn is_compilation_failure(&self) -> bool {
        matches!(self, Self::CompilationFailure { .. })
    }
}
