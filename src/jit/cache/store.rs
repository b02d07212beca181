use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use super::CacheEntry;
use crate::jit::signature::CacheKey;

/// Storage behind one function cache.
///
/// Implementations only need to be a map; single-flight compilation and
/// counting happen in [`FunctionCache`](super::FunctionCache).
pub trait EntryStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;

    /// Stores `entry` unless `key` is already present and returns whichever
    /// entry ends up stored.
    fn insert_if_absent(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Arc<CacheEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<CacheKey>;
}

/// Builds the store for each function cache the registry creates.
pub type StoreFactory = Arc<dyn Fn() -> Box<dyn EntryStore> + Send + Sync>;

pub fn in_memory_factory() -> StoreFactory {
    Arc::new(|| Box::new(InMemoryStore::default()) as Box<dyn EntryStore>)
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<AHashMap<CacheKey, Arc<CacheEntry>>>,
}

impl EntryStore for InMemoryStore {
    fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries.read().get(key).cloned()
    }

    fn insert_if_absent(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Arc<CacheEntry> {
        Arc::clone(self.entries.write().entry(key).or_insert(entry))
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.entries.read().keys().cloned().collect()
    }
}
