//! # Keyed Record Store
//!
//! A thread-safe, cloneable map used for records that live outside the
//! transactional [`Database`](crate::Database): export requests, published
//! links, and in-memory blobs. Each record is independent, so a single
//! lock per store is enough; nothing here needs a multi-record snapshot.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// Thread-safe, cloneable in-memory map.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug)]
pub struct Store<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    /// Insert only if the key is vacant. Returns `false` when it was taken.
    pub fn insert_new(&self, key: K, value: V) -> bool {
        let mut guard = self.data.write();
        if guard.contains_key(&key) {
            return false;
        }
        guard.insert(key, value);
        true
    }

    /// Retrieve a record by key.
    pub fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if
    /// not found.
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> Option<V> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(key)?;
        f(entry);
        Some(entry.clone())
    }

    /// Read, validate and update a record under one write lock.
    ///
    /// Returns `None` if the record doesn't exist, otherwise the closure's
    /// result. A closure that returns `Err` should leave the record as it
    /// found it.
    pub fn try_update<R, E>(
        &self,
        key: &K,
        f: impl FnOnce(&mut V) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(key).map(f)
    }

    /// Remove a record by key.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.data.write().remove(key)
    }

    /// Check if a record exists.
    pub fn contains(&self, key: &K) -> bool {
        self.data.read().contains_key(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
