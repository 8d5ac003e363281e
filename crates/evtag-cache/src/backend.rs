//! # Cache Backends
//!
//! [`CacheBackend`] is the storage seam of the projection cache. Two
//! implementations ship here: [`MemoryBackend`], a per-process map with
//! TTL expiry, and [`KeyValueBackend`], which speaks to any external keyed
//! store through the small [`KeyValueClient`] trait and stores values as
//! JSON text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::CacheError;

/// Keyed storage for projection values.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store an entry for `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Drop an entry. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Minimal client for an external keyed store with per-key expiry.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, String>;
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), String>;
    async fn del(&self, key: &str) -> Result<(), String>;
}

/// Backend over an external keyed store. Keys are namespaced with a
/// prefix so several deployments can share one store.
#[derive(Debug)]
pub struct KeyValueBackend<C> {
    client: C,
    prefix: String,
}

impl<C: KeyValueClient> KeyValueBackend<C> {
    pub fn new(client: C, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl<C: KeyValueClient> CacheBackend for KeyValueBackend<C> {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw = self
            .client
            .get(&self.namespaced(key))
            .await
            .map_err(CacheError::Unavailable)?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let text = serde_json::to_string(&value)?;
        self.client
            .set_ex(&self.namespaced(key), text, ttl)
            .await
            .map_err(CacheError::Unavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.client
            .del(&self.namespaced(key))
            .await
            .map_err(CacheError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[tokio::test]
    async fn memory_entries_expire() {
        let backend = MemoryBackend::new();
        backend
            .set("k", serde_json::json!(["a"]), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(serde_json::json!(["a"])));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[derive(Default)]
    struct MapClient {
        data: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KeyValueClient for MapClient {
        async fn get(&self, key: &str) -> Result<Option<String>, String> {
            Ok(self.data.lock().get(key).cloned())
        }
        async fn set_ex(&self, key: &str, value: String, _ttl: Duration) -> Result<(), String> {
            self.data.lock().insert(key.to_string(), value);
            Ok(())
        }
        async fn del(&self, key: &str) -> Result<(), String> {
            self.data.lock().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn key_value_backend_namespaces_and_encodes_json() {
        let backend = KeyValueBackend::new(MapClient::default(), "evtag:");
        backend
            .set("tags_filter_x", serde_json::json!(["a", "b"]), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            backend.client.data.lock().get("evtag:tags_filter_x").cloned(),
            Some("[\"a\",\"b\"]".to_string())
        );
        assert_eq!(
            backend.get("tags_filter_x").await.unwrap(),
            Some(serde_json::json!(["a", "b"]))
        );
        backend.delete("tags_filter_x").await.unwrap();
        assert_eq!(backend.get("tags_filter_x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_values_are_codec_errors() {
        let client = MapClient::default();
        client.data.lock().insert("k".into(), "{not json".into());
        let backend = KeyValueBackend::new(client, "");
        assert!(matches!(backend.get("k").await, Err(CacheError::Codec(_))));
    }
}
