use crate::error::StoreResult;

/// Opaque key-value store backing a record type.
///
/// All implementations must satisfy these invariants:
/// - `keys()` and `values()` enumerate in first-insertion order, and the two
///   sequences line up index for index.
/// - Overwriting an existing key replaces its blob but keeps its position.
/// - The store never interprets blob contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `blob` under `key`, replacing any previous blob.
    fn set(&self, key: &str, blob: Vec<u8>) -> StoreResult<()>;

    /// Remove `key`. Returns `true` if the key existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys, in first-insertion order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Check whether a key exists in the store.
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All blobs, in the same order as [`keys`](Self::keys).
    ///
    /// Default implementation calls `get()` for each key. Backends may
    /// override to read everything under a single lock.
    fn values(&self) -> StoreResult<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for key in self.keys()? {
            if let Some(blob) = self.get(&key)? {
                values.push(blob);
            }
        }
        Ok(values)
    }

    /// Number of stored keys.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }

    /// Returns `true` if the store holds no keys.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
