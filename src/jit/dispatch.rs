use std::fmt;
use std::sync::Arc;

use aotc_value::ArgValue;
use tracing::warn;

use super::cache::{CacheRegistry, FunctionCache, Resolved, StoreFactory};
use super::compiler::{Compiler, CompilerRegistry, Differentiator, Toolchain};
use super::function::UserFunction;
use super::signature::HasherStrategy;
use crate::config::CompileConfig;
use crate::error::CacheError;

/// Callable stand-in for a [`UserFunction`].
///
/// Every call is fingerprinted and served from the function's cache in the
/// registry, compiling on a miss. Wrappers are cheap; any number of them over
/// the same function share one cache.
#[derive(Clone)]
pub struct Dispatch {
    function: UserFunction,
    config: CompileConfig,
    toolchain: Toolchain,
    store_factory: Option<StoreFactory>,
    registry: Arc<CacheRegistry>,
}

impl Dispatch {
    pub fn builder(function: UserFunction) -> DispatchBuilder {
        DispatchBuilder::new(function)
    }

    /// Resolves the artifact for `args` and runs it on them.
    pub fn call(&self, args: &[ArgValue]) -> Result<Vec<ArgValue>, CacheError> {
        let resolved = self.resolve(args)?;
        Ok(resolved.entry.artifact().invoke(args)?)
    }

    /// Finds or compiles the entry for `args` without running it.
    pub fn resolve(&self, args: &[ArgValue]) -> Result<Resolved, CacheError> {
        loop {
            let (cache, generation) = self
                .registry
                .checkout(&self.function, self.store_factory.as_ref());
            let resolved = cache.resolve(&self.function, args, &self.config, &self.toolchain)?;
            if self.registry.generation() == generation {
                return Ok(resolved);
            }
            // The entry went into a cache that no longer exists.
            warn!(
                function = %self.function.name(),
                "compile cache cleared during resolve, resolving again"
            );
        }
    }

    /// True once at least one specialization is cached for the function.
    pub fn is_bound(&self) -> bool {
        self.cache().is_some_and(|cache| !cache.is_empty())
    }

    pub fn cache(&self) -> Option<Arc<FunctionCache>> {
        self.registry.get(self.function.id())
    }

    pub fn function(&self) -> &UserFunction {
        &self.function
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn is_differentiable(&self) -> bool {
        self.toolchain.is_differentiable()
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("function", &self.function)
            .field("config", &self.config)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

pub struct DispatchBuilder {
    function: UserFunction,
    config: CompileConfig,
    compiler: Option<Arc<dyn Compiler>>,
    differentiable: Option<(Arc<dyn Compiler>, Arc<dyn Compiler>, Arc<dyn Differentiator>)>,
    store_factory: Option<StoreFactory>,
    registry: Option<Arc<CacheRegistry>>,
}

impl DispatchBuilder {
    pub fn new(function: UserFunction) -> Self {
        Self {
            function,
            config: CompileConfig::default(),
            compiler: None,
            differentiable: None,
            store_factory: None,
            registry: None,
        }
    }

    pub fn config(mut self, config: CompileConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hasher(mut self, hasher: HasherStrategy) -> Self {
        self.config.hasher = hasher;
        self
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.config.backend = backend.into();
        self
    }

    /// Compiler used on a miss. Without one, the backend name is looked up
    /// in [`CompilerRegistry::global`].
    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Compiles forward/backward pairs instead of single artifacts.
    pub fn differentiable(
        mut self,
        forward: Arc<dyn Compiler>,
        backward: Arc<dyn Compiler>,
        differentiator: Arc<dyn Differentiator>,
    ) -> Self {
        self.differentiable = Some((forward, backward, differentiator));
        self
    }

    /// Store backing the function's cache.
    ///
    /// Only takes effect for the wrapper that creates the cache: once a
    /// function has a cache in the registry, every wrapper over it shares
    /// that store and a different factory here is ignored with a warning.
    pub fn function_cache(mut self, store_factory: StoreFactory) -> Self {
        self.store_factory = Some(store_factory);
        self
    }

    /// Registry to cache into; the global one by default.
    pub fn registry(mut self, registry: Arc<CacheRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Dispatch, CacheError> {
        let toolchain = match (self.differentiable, self.compiler) {
            (Some((forward, backward, differentiator)), _) => Toolchain::Differentiable {
                forward,
                backward,
                differentiator,
            },
            (None, Some(compiler)) => Toolchain::Plain(compiler),
            (None, None) => Toolchain::Plain(CompilerRegistry::global().get(&self.config.backend)?),
        };

        Ok(Dispatch {
            function: self.function,
            config: self.config,
            toolchain,
            store_factory: self.store_factory,
            registry: self.registry.unwrap_or_else(CacheRegistry::global),
        })
    }
}

/// Wraps `function` with the compiler registered for `config.backend`.
pub fn jit(function: UserFunction, config: CompileConfig) -> Result<Dispatch, CacheError> {
    Dispatch::builder(function).config(config).build()
}

/// Wraps `function` so each miss compiles a forward/backward pair.
pub fn aot_function(
    function: UserFunction,
    forward: Arc<dyn Compiler>,
    backward: Arc<dyn Compiler>,
    differentiator: Arc<dyn Differentiator>,
    config: CompileConfig,
) -> Result<Dispatch, CacheError> {
    Dispatch::builder(function)
        .config(config)
        .differentiable(forward, backward, differentiator)
        .build()
}
