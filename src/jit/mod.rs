pub mod cache;
pub mod compiler;
pub mod dispatch;
pub mod function;
pub mod signature;

pub use cache::{
    CacheEntry, CacheRegistry, FunctionCache, ResolveOutcome, Resolved, clear_compile_cache,
    num_of_recompilations,
};
pub use compiler::{
    Artifact, CompileError, CompiledFn, Compiler, CompilerRegistry, Differentiator, NopCompiler,
    Toolchain,
};
pub use dispatch::{Dispatch, DispatchBuilder, aot_function, jit};
pub use function::{FunctionId, UserFunction};
pub use signature::{ArgSignature, CacheKey, Fingerprint, HasherStrategy};
