// Compiled-function caching
pub mod function_cache;
pub mod metadata;
pub mod registry;
pub mod store;

pub use function_cache::{FunctionCache, FunctionCacheStats, ResolveOutcome, Resolved};
pub use metadata::{CacheMetadata, ExampleArg};
pub use registry::{
    CacheRegistry, RecompilationCounter, RegistryStats, clear_compile_cache,
    num_of_recompilations,
};
pub use store::{EntryStore, InMemoryStore, StoreFactory, in_memory_factory};

use aotc_value::ArgValue;
use serde::Serialize;

use super::compiler::Artifact;
use super::signature::CacheKey;

/// One compiled artifact and the example call it was compiled for.
///
/// Entries are immutable; a recompilation produces a new entry.
#[derive(Debug)]
pub struct CacheEntry {
    key: CacheKey,
    artifact: Artifact,
    example: Vec<ExampleArg>,
    metadata: CacheMetadata,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        artifact: Artifact,
        example_args: &[ArgValue],
        metadata: CacheMetadata,
    ) -> Self {
        Self {
            key,
            artifact,
            example: ExampleArg::describe(example_args),
            metadata,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn example(&self) -> &[ExampleArg] {
        &self.example
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.key.to_string_key(),
            differentiable: self.artifact.is_differentiable(),
            example: self.example.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Serializable view of a [`CacheEntry`].
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub differentiable: bool,
    pub example: Vec<ExampleArg>,
    pub metadata: CacheMetadata,
}
