//! # Blob Storage
//!
//! Evidence bytes live behind [`BlobStore`]. Attach-file writes each blob
//! once; exports read them. Keys are unique per write, so two evidences
//! with identical bytes never share a blob and deleting one cannot orphan
//! the other.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use evtag_core::{EvtagError, Result};

/// Pointer to stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Storage key.
    pub key: String,
    /// Hex SHA-256 of the bytes.
    pub sha256: String,
    /// Length in bytes.
    pub size: u64,
    /// MIME type recorded at upload.
    pub content_type: String,
}

/// Evidence byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh key.
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef>;

    /// Read back stored bytes.
    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>>;

    /// Remove stored bytes. Missing keys are not an error.
    async fn delete(&self, blob: &BlobRef) -> Result<()>;
}

/// Hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Guess a MIME type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "json" => "application/json",
        "html" | "laikapaper" => "text/html",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef> {
        let blob = BlobRef {
            key: format!("evidence/{}", uuid::Uuid::new_v4()),
            sha256: sha256_hex(&bytes),
            size: bytes.len() as u64,
            content_type: content_type.to_string(),
        };
        self.blobs.insert(blob.key.clone(), bytes);
        Ok(blob)
    }

    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        self.blobs
            .get(&blob.key)
            .map(|bytes| bytes.value().clone())
            .ok_or_else(|| EvtagError::Storage(format!("blob {} is missing", blob.key)))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<()> {
        self.blobs.remove(&blob.key);
        Ok(())
    }
}
