//! # evtag-cache — Projection Cache
//!
//! Memoized, per-organization projections (tag filters, document tags,
//! program progress) with commit-after invalidation.
//!
//! Mutations never touch the cache directly. They stage an
//! [`InvalidationBatch`] inside their transaction; the batch is returned
//! only if the transaction commits and is then handed to
//! [`ProjectionCache::flush`]. A rolled-back or timed-out transaction
//! drops its batch.
//!
//! Backends are pluggable through [`CacheBackend`]. A failing backend never
//! fails a mutation: writes log a warning, reads fall through to compute.

pub mod backend;
pub mod cache;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod locks;

pub use backend::{CacheBackend, KeyValueBackend, KeyValueClient, MemoryBackend};
pub use cache::{FlushReport, ProjectionCache};
pub use error::CacheError;
pub use invalidation::{Invalidation, InvalidationBatch, InvalidationMode};
pub use key::ProjectionKey;
pub use locks::KeyedLocks;
