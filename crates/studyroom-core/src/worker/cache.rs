// # Cache Storage
//
// Named response caches for the interception worker.
//
// ## Versioning
//
// Cache names carry a version suffix (`study-room-v1`). A new worker
// generation installs into fresh names and `activate` deletes every cache
// whose name it does not recognize, which is how stale shells from a
// previous deployment get evicted.

use std::collections::HashMap;

use crate::worker::fetch::Response;

/// Named in-memory response caches
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: HashMap<String, HashMap<String, Response>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a response under `key` in the named cache, creating the
    /// cache if needed. An existing entry for the key is replaced.
    pub fn put(&mut self, cache: &str, key: &str, response: Response) {
        self.caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    /// Look up a cached response
    pub fn get(&self, cache: &str, key: &str) -> Option<&Response> {
        self.caches.get(cache)?.get(key)
    }

    /// Delete an entire named cache. Deleting an absent cache is a no-op.
    pub fn delete_cache(&mut self, cache: &str) -> bool {
        self.caches.remove(cache).is_some()
    }

    /// Names of all caches currently present
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Number of entries in a named cache
    pub fn len(&self, cache: &str) -> usize {
        self.caches.get(cache).map(HashMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, cache: &str) -> bool {
        self.len(cache) == 0
    }
}
