//! # Projection Cache
//!
//! Read path: return the cached value unless it is absent or the caller
//! forces an update; otherwise recompute under the key's lock. A backend
//! failure on read is a miss.
//!
//! Write path: after a mutation commits, [`ProjectionCache::flush`] applies
//! its staged batch. `Refresh` entries are recomputed and stored before the
//! call returns, so the request that triggered them reads its own write.
//! `Delete` entries are dropped. Backend failures are logged and never undo
//! the committed mutation.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use evtag_core::Result;

use crate::backend::CacheBackend;
use crate::invalidation::{InvalidationBatch, InvalidationMode};
use crate::key::ProjectionKey;
use crate::locks::KeyedLocks;

/// Outcome counts of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub refreshed: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Memoized projections over a [`CacheBackend`].
pub struct ProjectionCache {
    backend: Arc<dyn CacheBackend>,
    locks: KeyedLocks,
    ttl: Duration,
}

impl std::fmt::Debug for ProjectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionCache")
            .field("ttl", &self.ttl)
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

impl ProjectionCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value of `key`, computing and storing it on a miss or when
    /// `force_update` is set.
    ///
    /// `compute` runs while the key's lock is held. It must read database
    /// state itself rather than close over a snapshot taken earlier, or a
    /// flush that commits in between is lost.
    pub async fn get_or_compute<T, F>(
        &self,
        key: &ProjectionKey,
        force_update: bool,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let name = key.cache_name();
        if !force_update {
            if let Some(hit) = self.read::<T>(&name).await {
                return Ok(hit);
            }
        }

        let _guard = self.locks.lock(&name).await;
        // Another reader may have filled the key while we waited.
        if !force_update {
            if let Some(hit) = self.read::<T>(&name).await {
                return Ok(hit);
            }
        }
        let value = compute()?;
        self.write(&name, &value).await;
        Ok(value)
    }

    /// Apply a committed mutation's invalidations.
    ///
    /// `recompute` produces the fresh JSON value for a `Refresh` key and runs
    /// under that key's lock. A recompute error drops the key instead so the
    /// next read rebuilds it. `Delete` also waits for the lock.
    pub async fn flush<F>(&self, batch: InvalidationBatch, recompute: F) -> FlushReport
    where
        F: Fn(&ProjectionKey) -> Result<Value>,
    {
        let mut report = FlushReport::default();
        for invalidation in batch {
            let name = invalidation.key.cache_name();
            match invalidation.mode {
                InvalidationMode::Delete => {
                    // A reader computing under this lock may hold a
                    // pre-commit snapshot; deleting after it finishes drops
                    // whatever it stored.
                    let _guard = self.locks.lock(&name).await;
                    if self.remove(&name).await {
                        report.deleted += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                InvalidationMode::Refresh => {
                    let _guard = self.locks.lock(&name).await;
                    match recompute(&invalidation.key) {
                        Ok(value) => {
                            if self.store(&name, value).await {
                                report.refreshed += 1;
                            } else {
                                report.failed += 1;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(key = %name, error = %err, "projection refresh failed, dropping entry");
                            self.remove(&name).await;
                            report.failed += 1;
                        }
                    }
                }
            }
        }
        report
    }

    /// Drop one key.
    pub async fn invalidate(&self, key: &ProjectionKey) {
        self.remove(&key.cache_name()).await;
    }

    /// Raw cached value, without computing. Backend errors read as `None`.
    pub async fn peek(&self, key: &ProjectionKey) -> Option<Value> {
        self.backend.get(&key.cache_name()).await.ok().flatten()
    }

    async fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.backend.get(name).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(hit) => Some(hit),
                Err(err) => {
                    tracing::warn!(key = name, error = %err, "cached projection has unexpected shape, recomputing");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = name, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, name: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => {
                self.store(name, json).await;
            }
            Err(err) => {
                tracing::warn!(key = name, error = %err, "projection could not be encoded for caching");
            }
        }
    }

    async fn store(&self, name: &str, value: Value) -> bool {
        match self.backend.set(name, value, self.ttl).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = name, error = %err, "cache write failed");
                false
            }
        }
    }

    async fn remove(&self, name: &str) -> bool {
        match self.backend.delete(name).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = name, error = %err, "cache delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::CacheError;
    use async_trait::async_trait;
    use evtag_core::{EvtagError, OrganizationId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> ProjectionCache {
        ProjectionCache::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60))
    }

    fn key() -> ProjectionKey {
        ProjectionKey::TagsFilter {
            organization: OrganizationId::new(),
        }
    }

    #[tokio::test]
    async fn hit_skips_compute_and_force_recomputes() {
        let cache = cache();
        let key = key();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["a".to_string()])
        };
        let first: Vec<String> = cache.get_or_compute(&key, false, compute).await.unwrap();
        let second: Vec<String> = cache.get_or_compute(&key, false, compute).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _: Vec<String> = cache.get_or_compute(&key, true, compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_compute_once() {
        let cache = Arc::new(cache());
        let key = key();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key, false, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        Ok(42u32)
                    })
                    .await
                    .unwrap()
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_errors_propagate_and_are_not_cached() {
        let cache = cache();
        let key = key();
        let err = cache
            .get_or_compute::<u32, _>(&key, false, || Err(EvtagError::not_found("program", "p")))
            .await
            .unwrap_err();
        assert!(matches!(err, EvtagError::NotFound { .. }));
        assert!(cache.peek(&key).await.is_none());
    }

    #[tokio::test]
    async fn flush_refreshes_and_deletes() {
        let cache = cache();
        let org = OrganizationId::new();
        let refreshed = ProjectionKey::TagsFilter { organization: org };
        let dropped = ProjectionKey::ManualTagsFor {
            organization: org,
            evidence: evtag_core::EvidenceId::new(),
        };
        let _: u32 = cache.get_or_compute(&dropped, false, || Ok(1)).await.unwrap();

        let mut batch = InvalidationBatch::new();
        batch.refresh(refreshed);
        batch.delete(dropped);
        let report = cache
            .flush(batch, |_| Ok(serde_json::json!(["fresh"])))
            .await;
        assert_eq!(
            report,
            FlushReport {
                refreshed: 1,
                deleted: 1,
                failed: 0
            }
        );
        assert_eq!(cache.peek(&refreshed).await, Some(serde_json::json!(["fresh"])));
        assert!(cache.peek(&dropped).await.is_none());
    }

    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_compute() {
        let cache = ProjectionCache::new(Arc::new(DownBackend), Duration::from_secs(60));
        let key = key();
        let value: u32 = cache.get_or_compute(&key, false, || Ok(7)).await.unwrap();
        assert_eq!(value, 7);

        let mut batch = InvalidationBatch::new();
        batch.refresh(key);
        let report = cache.flush(batch, |_| Ok(serde_json::json!(1))).await;
        assert_eq!(report.failed, 1);
    }
}
