use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::diff::{self, Change, ChangeEvent, OldEntry};
use crate::error::{Error, Result};

/// Separator between namespace and key in a qualified cache key.
pub const SEPARATOR: &str = ".";

/// How cache keys are formed. Chosen once per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// `namespace.key`
    #[default]
    Qualified,
    /// Bare `key`, shared by all namespaces; every entry is tagged with the
    /// namespace that last wrote it.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub namespace: String,
}

impl CacheEntry {
    fn weight(key: &str, entry: &CacheEntry) -> usize {
        key.len() + entry.value.len() + entry.namespace.len()
    }
}

/// Bounded key/value storage behind the snapshot cache.
pub trait CacheStore: Send {
    fn get(&mut self, key: &str) -> Option<CacheEntry>;
    fn set(&mut self, key: String, entry: CacheEntry);
    fn delete(&mut self, key: &str) -> bool;
    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &CacheEntry)> + '_>;
    fn clear(&mut self);
    fn count(&self) -> usize;
}

/// LRU store bounded by the byte size of its keys and values.
pub struct LruStore {
    entries: LruCache<String, CacheEntry>,
    capacity: usize,
    used: usize,
}

impl LruStore {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: capacity_bytes,
            used: 0,
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    fn evict(&mut self, keep: &str) {
        while self.used > self.capacity && self.entries.len() > 1 {
            let Some((key, entry)) = self.entries.peek_lru() else {
                break;
            };
            if key == keep {
                break;
            }
            let weight = CacheEntry::weight(key, entry);
            if let Some((key, _)) = self.entries.pop_lru() {
                debug!(%key, "evicted cache entry");
            }
            self.used -= weight;
        }
    }
}

impl CacheStore for LruStore {
    fn get(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: String, entry: CacheEntry) {
        let weight = CacheEntry::weight(&key, &entry);
        if let Some(prev) = self.entries.put(key.clone(), entry) {
            self.used -= CacheEntry::weight(&key, &prev);
        }
        self.used += weight;
        self.evict(&key);
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.entries.pop_entry(key) {
            Some((key, entry)) => {
                self.used -= CacheEntry::weight(&key, &entry);
                true
            }
            None => false,
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &CacheEntry)> + '_> {
        Box::new(self.entries.iter())
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Namespace-aware view over a [`CacheStore`]. Every operation takes the one
/// lock for its whole duration.
pub struct SnapshotCache {
    store: Mutex<Box<dyn CacheStore>>,
    mode: KeyMode,
}

impl SnapshotCache {
    pub fn new(capacity_bytes: usize, mode: KeyMode) -> Self {
        Self::with_store(Box::new(LruStore::new(capacity_bytes)), mode)
    }

    pub fn with_store(store: Box<dyn CacheStore>, mode: KeyMode) -> Self {
        Self {
            store: Mutex::new(store),
            mode,
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn CacheStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache_key(&self, namespace: &str, key: &str) -> String {
        match self.mode {
            KeyMode::Qualified => format!("{}{}{}", namespace, SEPARATOR, key),
            KeyMode::Bare => key.to_string(),
        }
    }

    /// Current value of `key` in `namespace`.
    pub fn get(&self, namespace: &str, key: &str) -> Result<String> {
        self.get_raw(&self.cache_key(namespace, key))
    }

    /// Lookup by an already formed cache key.
    pub fn get_raw(&self, cache_key: &str) -> Result<String> {
        self.lock()
            .get(cache_key)
            .map(|e| e.value)
            .ok_or_else(|| Error::NotFound(cache_key.to_string()))
    }

    /// Entries the diff for `namespace` has to consider.
    fn old_entries(&self, store: &dyn CacheStore, namespace: &str) -> Vec<OldEntry> {
        match self.mode {
            KeyMode::Qualified => {
                let prefix = format!("{}{}", namespace, SEPARATOR);
                store
                    .iter()
                    .filter_map(|(k, e)| {
                        k.strip_prefix(&prefix).map(|key| OldEntry {
                            key: key.to_string(),
                            value: e.value.clone(),
                            namespace: namespace.to_string(),
                        })
                    })
                    .collect()
            }
            KeyMode::Bare => store
                .iter()
                .map(|(k, e)| OldEntry {
                    key: k.clone(),
                    value: e.value.clone(),
                    namespace: e.namespace.clone(),
                })
                .collect(),
        }
    }

    fn apply_to(&self, store: &mut dyn CacheStore, event: &ChangeEvent) {
        for change in &event.changes {
            let cache_key = self.cache_key(&event.namespace, change.key());
            match change {
                Change::Added { new_value, .. } | Change::Modified { new_value, .. } => {
                    store.set(
                        cache_key,
                        CacheEntry {
                            value: new_value.clone(),
                            namespace: event.namespace.clone(),
                        },
                    );
                }
                Change::Deleted { .. } => {
                    store.delete(&cache_key);
                }
            }
        }
    }

    /// Changes that would turn the cached view of `namespace` into `fresh`.
    pub fn diff(&self, namespace: &str, fresh: &BTreeMap<String, String>) -> ChangeEvent {
        let store = self.lock();
        diff::diff(namespace, fresh, self.old_entries(&**store, namespace))
    }

    /// Apply a whole event under one lock so readers never see it half done.
    pub fn apply(&self, event: &ChangeEvent) {
        let mut store = self.lock();
        self.apply_to(&mut **store, event);
    }

    /// Diff `fresh` against the cache and apply the result, all under one
    /// lock. In bare-key mode, unchanged keys that `fresh` shares with
    /// another namespace are retagged to `namespace`, so the last writer owns
    /// them and a later removal from the other namespace keeps them.
    pub fn sync(&self, namespace: &str, fresh: &BTreeMap<String, String>) -> ChangeEvent {
        let mut store = self.lock();
        let old = self.old_entries(&**store, namespace);

        let shared: Vec<OldEntry> = old
            .iter()
            .filter(|e| e.namespace != namespace && fresh.get(&e.key) == Some(&e.value))
            .cloned()
            .collect();

        let event = diff::diff(namespace, fresh, old);
        self.apply_to(&mut **store, &event);

        for entry in shared {
            debug!(key = %entry.key, from = %entry.namespace, to = %namespace, "retag shared key");
            store.set(
                entry.key,
                CacheEntry {
                    value: entry.value,
                    namespace: namespace.to_string(),
                },
            );
        }
        event
    }

    /// Cached values of one namespace, keyed by bare key.
    pub fn namespace_map(&self, namespace: &str) -> BTreeMap<String, String> {
        let store = self.lock();
        self.old_entries(&**store, namespace)
            .into_iter()
            .filter(|e| e.namespace == namespace)
            .map(|e| (e.key, e.value))
            .collect()
    }

    /// The whole cache keyed by cache key.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
