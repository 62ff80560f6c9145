use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

const DEFAULT_PURGE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct Store<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// The size at which the next insert sweeps out expired entries
    purge_at: usize,
}

/// A small in-memory cache whose entries expire after a fixed time-to-live. Clones share the same store.
///
/// An expired entry is dropped when it is next read. Entries that are never read again are swept out by `insert` once
/// the map grows past the purge threshold. If most entries are still live after a sweep, the threshold doubles, so a
/// busy cache is not rescanned on every insert.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    store: Arc<RwLock<Store<K, V>>>,
    ttl: Duration,
    purge_threshold: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_purge_threshold(ttl, DEFAULT_PURGE_THRESHOLD)
    }

    pub fn with_purge_threshold(ttl: Duration, purge_threshold: usize) -> Self {
        let purge_threshold = purge_threshold.max(1);
        let store = Store { entries: HashMap::new(), purge_at: purge_threshold };
        Self { store: Arc::new(RwLock::new(store)), ttl, purge_threshold }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let store = self.store.read().unwrap_or_else(|e| e.into_inner());
            match store.entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {},
                None => return None,
            }
        }
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        if store.entries.get(key).is_some_and(|e| e.expires_at <= now) {
            store.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let entry = CacheEntry { value, expires_at: now + self.ttl };
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        if store.entries.len() >= store.purge_at && !store.entries.contains_key(&key) {
            store.entries.retain(|_, e| e.expires_at > now);
            store.purge_at = self.purge_threshold.max(store.entries.len() * 2);
        }
        store.entries.insert(key, entry);
    }

    pub fn invalidate(&self, key: &K) {
        self.store.write().unwrap_or_else(|e| e.into_inner()).entries.remove(key);
    }

    pub fn clear(&self) {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.entries.clear();
        store.purge_at = self.purge_threshold;
    }
}
