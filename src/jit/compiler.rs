//! Boundary with the external compiler and differentiation services.
//!
//! The cache never looks inside an artifact: it asks a [`Compiler`] (or a
//! [`Differentiator`] pairing two compilers) for one on a miss and invokes it
//! afterwards.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use aotc_value::{ArgValue, CallError};
use thiserror::Error;

use super::function::{FunctionBody, UserFunction};
use crate::error::CacheError;

/// Directly invokable output of a compiler.
pub type CompiledFn = Arc<FunctionBody>;

/// Backend name of [`NopCompiler`].
pub const NOP_BACKEND: &str = "nop";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler rejected the function: {0}")]
    Rejected(String),
    #[error("tracing the example call failed")]
    Trace(#[from] CallError),
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Compiled form of a user function.
#[derive(Clone)]
pub enum Artifact {
    Compiled(CompiledFn),
    /// Paired forward/backward callables from a [`Differentiator`].
    ForwardBackward {
        forward: CompiledFn,
        backward: CompiledFn,
    },
}

impl Artifact {
    pub fn compiled<F>(f: F) -> Self
    where
        F: Fn(&[ArgValue]) -> Result<Vec<ArgValue>, CallError> + Send + Sync + 'static,
    {
        Self::Compiled(Arc::new(f))
    }

    /// Runs the artifact (the forward half of a pair) on real arguments.
    pub fn invoke(&self, args: &[ArgValue]) -> Result<Vec<ArgValue>, CallError> {
        match self {
            Self::Compiled(call) => call(args),
            Self::ForwardBackward { forward, .. } => forward(args),
        }
    }

    pub fn backward(&self) -> Option<&CompiledFn> {
        match self {
            Self::Compiled(_) => None,
            Self::ForwardBackward { backward, .. } => Some(backward),
        }
    }

    pub fn is_differentiable(&self) -> bool {
        matches!(self, Self::ForwardBackward { .. })
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compiled(_) => f.write_str("Artifact::Compiled(..)"),
            Self::ForwardBackward { .. } => f.write_str("Artifact::ForwardBackward(..)"),
        }
    }
}

/// Ahead-of-time compiler service, invoked only on a cache miss.
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        function: &UserFunction,
        example_args: &[ArgValue],
        backend: &str,
    ) -> Result<CompiledFn, CompileError>;
}

impl<F> Compiler for F
where
    F: Fn(&UserFunction, &[ArgValue], &str) -> Result<CompiledFn, CompileError> + Send + Sync,
{
    fn compile(
        &self,
        function: &UserFunction,
        example_args: &[ArgValue],
        backend: &str,
    ) -> Result<CompiledFn, CompileError> {
        self(function, example_args, backend)
    }
}

/// Produces a forward/backward pair from two compilers.
pub trait Differentiator: Send + Sync {
    fn pair(
        &self,
        function: &UserFunction,
        example_args: &[ArgValue],
        forward: &dyn Compiler,
        backward: &dyn Compiler,
        backend: &str,
    ) -> Result<Artifact, CompileError>;
}

/// Returns the traced function unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCompiler;

impl Compiler for NopCompiler {
    fn compile(
        &self,
        function: &UserFunction,
        _example_args: &[ArgValue],
        _backend: &str,
    ) -> Result<CompiledFn, CompileError> {
        Ok(function.body())
    }
}

/// How a dispatch turns a miss into an artifact.
#[derive(Clone)]
pub enum Toolchain {
    Plain(Arc<dyn Compiler>),
    Differentiable {
        forward: Arc<dyn Compiler>,
        backward: Arc<dyn Compiler>,
        differentiator: Arc<dyn Differentiator>,
    },
}

impl Toolchain {
    pub fn is_differentiable(&self) -> bool {
        matches!(self, Self::Differentiable { .. })
    }

    pub fn compile(
        &self,
        function: &UserFunction,
        example_args: &[ArgValue],
        backend: &str,
    ) -> Result<Artifact, CompileError> {
        match self {
            Self::Plain(compiler) => compiler
                .compile(function, example_args, backend)
                .map(Artifact::Compiled),
            Self::Differentiable {
                forward,
                backward,
                differentiator,
            } => differentiator.pair(
                function,
                example_args,
                forward.as_ref(),
                backward.as_ref(),
                backend,
            ),
        }
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Toolchain::Plain"),
            Self::Differentiable { .. } => f.write_str("Toolchain::Differentiable"),
        }
    }
}

/// Backend name to compiler lookup.
#[derive(Clone)]
pub struct CompilerRegistry {
    compilers: Arc<RwLock<AHashMap<String, Arc<dyn Compiler>>>>,
}

impl CompilerRegistry {
    /// A registry with only the `nop` backend.
    pub fn new() -> Self {
        let mut compilers: AHashMap<String, Arc<dyn Compiler>> = AHashMap::new();
        compilers.insert(NOP_BACKEND.to_string(), Arc::new(NopCompiler));
        Self {
            compilers: Arc::new(RwLock::new(compilers)),
        }
    }

    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<CompilerRegistry> = Lazy::new(CompilerRegistry::new);
        &GLOBAL
    }

    /// Registers `compiler` under `name`, returning the compiler it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Option<Arc<dyn Compiler>> {
        self.compilers.write().insert(name.into(), compiler)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Compiler>, CacheError> {
        self.compilers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownBackend {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.compilers.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl Default for CompilerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
