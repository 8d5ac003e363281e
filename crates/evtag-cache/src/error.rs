//! # Cache Errors

use thiserror::Error;

use evtag_core::EvtagError;

/// Failures of a cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend could not be reached or refused the command.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("cache value codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<CacheError> for EvtagError {
    fn from(err: CacheError) -> Self {
        EvtagError::CacheBackendUnavailable(err.to_string())
    }
}
