use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use aotc_value::ArgValue;
use tracing::{debug, info};

use super::registry::RecompilationCounter;
use super::store::{EntryStore, InMemoryStore, StoreFactory};
use super::{CacheEntry, CacheMetadata};
use crate::config::CompileConfig;
use crate::error::CacheError;
use crate::jit::compiler::Toolchain;
use crate::jit::function::{FunctionId, UserFunction};
use crate::jit::signature::CacheKey;

/// How [`FunctionCache::resolve`] obtained its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Hit,
    /// Another caller was compiling the same key; its result was reused.
    Awaited,
    Compiled,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub entry: Arc<CacheEntry>,
    pub outcome: ResolveOutcome,
}

/// Cache of compiled artifacts for one user function.
pub struct FunctionCache {
    function: FunctionId,
    name: Arc<str>,
    store: Box<dyn EntryStore>,
    store_factory: Option<StoreFactory>,
    // Per-key compile gates; a gate lives from the first miss until a compile succeeds.
    gates: Mutex<AHashMap<CacheKey, Arc<Mutex<()>>>>,
    counter: Arc<RecompilationCounter>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FunctionCache {
    pub fn new(
        function: &UserFunction,
        store: Box<dyn EntryStore>,
        counter: Arc<RecompilationCounter>,
    ) -> Self {
        Self {
            function: function.id(),
            name: Arc::from(function.name()),
            store,
            store_factory: None,
            gates: Mutex::new(AHashMap::new()),
            counter,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Builds the store from `store_factory`, or an [`InMemoryStore`] when
    /// none is given, and remembers which factory was used.
    pub(crate) fn with_factory(
        function: &UserFunction,
        store_factory: Option<&StoreFactory>,
        counter: Arc<RecompilationCounter>,
    ) -> Self {
        let store = match store_factory {
            Some(factory) => factory(),
            None => Box::new(InMemoryStore::default()),
        };
        Self {
            store_factory: store_factory.cloned(),
            ..Self::new(function, store, counter)
        }
    }

    pub(crate) fn built_with(&self, store_factory: &StoreFactory) -> bool {
        self.store_factory
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, store_factory))
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Returns the entry for this call's signature, compiling it on a miss.
    ///
    /// At most one compile runs per key; concurrent callers missing on the
    /// same key wait for it and reuse its entry. A failed compile stores
    /// nothing and does not bump the recompilation counter.
    pub fn resolve(
        &self,
        function: &UserFunction,
        args: &[ArgValue],
        config: &CompileConfig,
        toolchain: &Toolchain,
    ) -> Result<Resolved, CacheError> {
        let fingerprint = config.hasher.fingerprint(args)?;
        let key = CacheKey::new(&config.backend, toolchain.is_differentiable(), fingerprint);

        if let Some(entry) = self.store.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(function = %self.name, key = %key, "compile cache hit");
            return Ok(Resolved {
                entry,
                outcome: ResolveOutcome::Hit,
            });
        }

        let gate = self.gate(&key);
        let _compiling = gate.lock();

        if let Some(entry) = self.store.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(function = %self.name, key = %key, "reused concurrent compile");
            return Ok(Resolved {
                entry,
                outcome: ResolveOutcome::Awaited,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let artifact = match toolchain.compile(function, args, &config.backend) {
            Ok(artifact) => artifact,
            Err(source) => {
                self.release_gate(&key, &gate);
                return Err(CacheError::CompilationFailure {
                    backend: config.backend.clone(),
                    function: self.name.to_string(),
                    source,
                });
            }
        };
        let compilation_time = started.elapsed();

        let metadata = CacheMetadata::new(&*self.name, config.backend.as_str(), compilation_time);
        let entry = Arc::new(CacheEntry::new(key.clone(), artifact, args, metadata));
        let (entry, total) = self
            .counter
            .record_with(|| self.store.insert_if_absent(key.clone(), entry));
        self.gates.lock().remove(&key);

        info!(
            function = %self.name,
            key = %key,
            hasher = %config.hasher,
            elapsed_ms = compilation_time.as_secs_f64() * 1000.0,
            recompilations = total,
            "compiled new specialization"
        );

        Ok(Resolved {
            entry,
            outcome: ResolveOutcome::Compiled,
        })
    }

    fn gate(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        Arc::clone(self.gates.lock().entry(key.clone()).or_default())
    }

    // Drops a failed key's gate unless another caller is queued on it.
    fn release_gate(&self, key: &CacheKey, gate: &Arc<Mutex<()>>) {
        let mut gates = self.gates.lock();
        if Arc::strong_count(gate) == 2 {
            gates.remove(key);
        }
    }

    #[cfg(test)]
    fn pending_gates(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.store.get(key)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> FunctionCacheStats {
        FunctionCacheStats {
            function: self.name.to_string(),
            entries: self.store.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionCacheStats {
    pub function: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
