use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use super::function_cache::{FunctionCache, FunctionCacheStats};
use super::store::StoreFactory;
use crate::jit::function::{FunctionId, UserFunction};

/// Cumulative number of compilations. Never reset.
///
/// Readers block while a compilation is being published, so an entry is
/// never observable before it has been counted.
#[derive(Debug, Default)]
pub struct RecompilationCounter {
    publishing: RwLock<()>,
    total: AtomicU64,
}

impl RecompilationCounter {
    /// Runs `publish` and counts one compilation as a single step.
    ///
    /// `publish` must not read this counter.
    pub fn record_with<T>(&self, publish: impl FnOnce() -> T) -> (T, u64) {
        let _publishing = self.publishing.write();
        let published = publish();
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        (published, total)
    }

    pub fn get(&self) -> u64 {
        let _published = self.publishing.read();
        self.total.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RegistryState {
    caches: AHashMap<FunctionId, Arc<FunctionCache>>,
    generation: u64,
}

/// Function identity to [`FunctionCache`] mapping.
///
/// Caches are created on first use and dropped only by [`clear`](Self::clear).
/// The recompilation counter outlives clears; callers measure deltas.
#[derive(Default)]
pub struct CacheRegistry {
    state: RwLock<RegistryState>,
    counter: Arc<RecompilationCounter>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        static GLOBAL: Lazy<Arc<CacheRegistry>> = Lazy::new(|| Arc::new(CacheRegistry::new()));
        Arc::clone(&GLOBAL)
    }

    /// Returns the function's cache, building its store with
    /// `store_factory` if the cache does not exist yet.
    ///
    /// The first caller decides the store; a later, different factory is
    /// ignored with a warning.
    pub fn get_or_create(
        &self,
        function: &UserFunction,
        store_factory: &StoreFactory,
    ) -> Arc<FunctionCache> {
        self.checkout(function, Some(store_factory)).0
    }

    /// Like [`get_or_create`](Self::get_or_create), also returning the
    /// generation the cache belongs to. `None` means the in-memory store.
    pub(crate) fn checkout(
        &self,
        function: &UserFunction,
        store_factory: Option<&StoreFactory>,
    ) -> (Arc<FunctionCache>, u64) {
        let existing = {
            let state = self.state.read();
            state
                .caches
                .get(&function.id())
                .map(|cache| (Arc::clone(cache), state.generation))
        };

        let (cache, generation) = match existing {
            Some(found) => found,
            None => {
                let mut state = self.state.write();
                let generation = state.generation;
                let cache = state.caches.entry(function.id()).or_insert_with(|| {
                    Arc::new(FunctionCache::with_factory(
                        function,
                        store_factory,
                        Arc::clone(&self.counter),
                    ))
                });
                (Arc::clone(cache), generation)
            }
        };

        if let Some(factory) = store_factory {
            if !cache.built_with(factory) {
                warn!(
                    function = %function.name(),
                    "function cache already exists with another store, ignoring store factory"
                );
            }
        }
        (cache, generation)
    }

    pub fn get(&self, function: FunctionId) -> Option<Arc<FunctionCache>> {
        self.state.read().caches.get(&function).cloned()
    }

    /// Drops every function cache at once.
    ///
    /// In-flight resolves keep their old cache alive until they finish; the
    /// dispatch layer notices the generation change and resolves again.
    pub fn clear(&self) {
        let discarded = {
            let mut state = self.state.write();
            state.generation += 1;
            std::mem::take(&mut state.caches)
        };
        info!(
            functions = discarded.len(),
            recompilations = self.counter.get(),
            "compile cache cleared"
        );
        // Artifacts are released here, outside the lock.
        drop(discarded);
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn recompilation_count(&self) -> u64 {
        self.counter.get()
    }

    pub fn function_count(&self) -> usize {
        self.state.read().caches.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let mut functions = state
            .caches
            .values()
            .map(|cache| cache.stats())
            .collect::<Vec<_>>();
        functions.sort_by(|a, b| a.function.cmp(&b.function));

        RegistryStats {
            generation: state.generation,
            recompilations: self.counter.get(),
            entries: functions.iter().map(|f| f.entries).sum(),
            hits: functions.iter().map(|f| f.hits).sum(),
            misses: functions.iter().map(|f| f.misses).sum(),
            functions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub generation: u64,
    pub recompilations: u64,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub functions: Vec<FunctionCacheStats>,
}

/// Cumulative compilations recorded by the global registry.
pub fn num_of_recompilations() -> u64 {
    CacheRegistry::global().recompilation_count()
}

/// Clears the global registry.
pub fn clear_compile_cache() {
    CacheRegistry::global().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::cache::store::in_memory_factory;
    use aotc_value::ArgValue;

    fn noop(name: &str) -> UserFunction {
        UserFunction::new(name, |args: &[ArgValue]| Ok(args.to_vec()))
    }

    #[test]
    fn caches_are_created_lazily_and_reused() {
        let registry = CacheRegistry::new();
        let factory = in_memory_factory();
        let f = noop("f");

        assert!(registry.get(f.id()).is_none());
        let first = registry.get_or_create(&f, &factory);
        let second = registry.get_or_create(&f, &factory);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.function_count(), 1);
    }

    #[test]
    fn clear_drops_caches_but_not_the_counter() {
        let registry = CacheRegistry::new();
        let factory = in_memory_factory();
        let f = noop("f");

        let before = registry.get_or_create(&f, &factory);
        registry.counter.record_with(|| ());
        registry.clear();

        assert_eq!(registry.function_count(), 0);
        assert_eq!(registry.generation(), 1);
        assert_eq!(registry.recompilation_count(), 1);

        let after = registry.get_or_create(&f, &factory);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn first_store_factory_wins() {
        use std::sync::atomic::AtomicUsize;

        let registry = CacheRegistry::new();
        let f = noop("f");
        let built = Arc::new(AtomicUsize::new(0));
        let custom: StoreFactory = {
            let built = Arc::clone(&built);
            Arc::new(move || {
                built.fetch_add(1, Ordering::SeqCst);
                in_memory_factory()()
            })
        };

        let (first, _) = registry.checkout(&f, None);
        let (second, _) = registry.checkout(&f, Some(&custom));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(!second.built_with(&custom));

        let g = noop("g");
        let owned = registry.get_or_create(&g, &custom);
        assert!(owned.built_with(&custom));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn counter_returns_running_total() {
        let counter = RecompilationCounter::default();
        assert_eq!(counter.record_with(|| ()).1, 1);
        assert_eq!(counter.record_with(|| "entry"), ("entry", 2));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn readers_wait_for_publication_to_be_counted() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let counter = Arc::new(RecompilationCounter::default());
        let (tx, rx) = mpsc::channel();

        let (reader, total) = counter.record_with(|| {
            let counter = Arc::clone(&counter);
            let reader = thread::spawn(move || {
                let seen = counter.get();
                tx.send(seen).ok();
                seen
            });
            thread::sleep(Duration::from_millis(30));
            assert!(rx.try_recv().is_err(), "read the counter mid-publication");
            reader
        });

        assert_eq!(total, 1);
        assert_eq!(reader.join().unwrap(), 1);
    }
}
