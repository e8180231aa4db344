use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::KeyValueStore;

/// A stored blob plus the sequence number of the key's first insertion.
#[derive(Clone, Debug)]
struct Slot {
    seq: u64,
    blob: Vec<u8>,
}

/// Insertion-ordered map shared by the in-memory and file-backed stores.
///
/// Keys keep the sequence number of their first insertion, so overwriting a
/// key does not move it to the end.
#[derive(Clone, Debug, Default)]
pub(crate) struct Entries {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl Entries {
    pub(crate) fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.slots.get(key).map(|slot| &slot.blob)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn insert(&mut self, key: &str, blob: Vec<u8>) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.blob = blob;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(key.to_string(), Slot { seq, blob });
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Entries sorted by first-insertion order.
    pub(crate) fn ordered(&self) -> Vec<(&String, &Vec<u8>)> {
        let mut entries: Vec<(&String, &Slot)> = self.slots.iter().collect();
        entries.sort_by_key(|(_, slot)| slot.seq);
        entries
            .into_iter()
            .map(|(key, slot)| (key, &slot.blob))
            .collect()
    }
}

/// In-memory, map-based key-value store.
///
/// Intended for tests and embedding, and used as the default store for a
/// record type that was never bound to one. Blobs are cloned on read/write.
pub struct InMemoryStore {
    entries: RwLock<Entries>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Create a store pre-populated with the given entries, in order.
    pub fn with_entries<K, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Vec<u8>)>,
    {
        let mut map = Entries::default();
        for (key, blob) in entries {
            map.insert(key.as_ref(), blob);
        }
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .ordered()
            .iter()
            .map(|(_, blob)| blob.len() as u64)
            .sum()
    }

    /// Remove all entries from the store.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, blob: Vec<u8>) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let len = blob.len();
        self.entries.write().expect("lock poisoned").insert(key, blob);
        debug!(key, len, "memory store set");
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(map.remove(key))
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains(key))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.ordered().into_iter().map(|(k, _)| k.clone()).collect())
    }

    fn values(&self) -> StoreResult<Vec<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.ordered().into_iter().map(|(_, v)| v.clone()).collect())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().expect("lock poisoned").len())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("entry_count", &count)
            .finish()
    }
}
