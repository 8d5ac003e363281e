//! # Invalidation Batches
//!
//! Mutations stage invalidations while their transaction runs and hand the
//! batch back on success. Only a committed transaction's batch is ever
//! flushed; a rollback drops it with the rest of the working state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::ProjectionKey;

/// How an invalidated projection is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationMode {
    /// Drop the entry; the next read recomputes it.
    Delete,
    /// Recompute and store immediately.
    Refresh,
}

/// One staged invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub key: ProjectionKey,
    pub mode: InvalidationMode,
}

/// Deduplicated invalidations, in key order. When the same key is staged
/// twice, [`InvalidationMode::Refresh`] wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationBatch {
    entries: BTreeMap<ProjectionKey, InvalidationMode>,
}

impl InvalidationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one invalidation.
    pub fn push(&mut self, key: ProjectionKey, mode: InvalidationMode) {
        let slot = self.entries.entry(key).or_insert(mode);
        *slot = (*slot).max(mode);
    }

    pub fn refresh(&mut self, key: ProjectionKey) {
        self.push(key, InvalidationMode::Refresh);
    }

    pub fn delete(&mut self, key: ProjectionKey) {
        self.push(key, InvalidationMode::Delete);
    }

    /// Stage `keys` with one mode.
    pub fn extend(&mut self, keys: impl IntoIterator<Item = ProjectionKey>, mode: InvalidationMode) {
        for key in keys {
            self.push(key, mode);
        }
    }

    /// Merge another batch into this one.
    pub fn merge(&mut self, other: InvalidationBatch) {
        for (key, mode) in other.entries {
            self.push(key, mode);
        }
    }

    /// Mode staged for `key`, if any.
    pub fn mode_of(&self, key: &ProjectionKey) -> Option<InvalidationMode> {
        self.entries.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Invalidation> + '_ {
        self.entries
            .iter()
            .map(|(key, mode)| Invalidation { key: *key, mode: *mode })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for InvalidationBatch {
    type Item = Invalidation;
    type IntoIter = std::vec::IntoIter<Invalidation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .into_iter()
            .map(|(key, mode)| Invalidation { key, mode })
            .collect::<Vec<_>>()
            .into_iter()
    }
}
