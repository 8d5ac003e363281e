//! # Object Storage
//!
//! Where finished archives go and how their download URLs are minted.
//!
//! A link's expiry comes from, in order: the expiry the storage backend
//! reports alongside the signed URL, the `X-Amz-Date` plus `X-Amz-Expires`
//! query parameters of an S3-style presigned URL, and finally the link's
//! creation time plus a fallback lifetime.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;

use evtag_core::{EvtagError, Result};

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A time-limited download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    /// Set when the backend reports the expiry explicitly.
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn presign(&self, key: &str, ttl: Duration) -> Result<SignedUrl>;
}

/// Expiry encoded in an S3-style presigned URL.
pub fn amz_expiry(url: &str) -> Option<DateTime<Utc>> {
    let url = url::Url::parse(url).ok()?;
    let mut signed_at = None;
    let mut lifetime = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "X-Amz-Date" => {
                signed_at = NaiveDateTime::parse_from_str(&value, AMZ_DATE_FORMAT)
                    .ok()
                    .map(|t| t.and_utc());
            }
            "X-Amz-Expires" => lifetime = value.parse::<i64>().ok(),
            _ => {}
        }
    }
    Some(signed_at? + chrono::Duration::seconds(lifetime?))
}

/// When a link minted from `signed` at `created_at` stops working.
pub fn link_expiry(
    signed: &SignedUrl,
    created_at: DateTime<Utc>,
    fallback: Duration,
) -> DateTime<Utc> {
    signed
        .expires_at
        .or_else(|| amz_expiry(&signed.url))
        .unwrap_or_else(|| {
            let secs = i64::try_from(fallback.as_secs()).unwrap_or(i64::MAX / 1000);
            created_at + chrono::Duration::seconds(secs)
        })
}

/// How [`MemoryObjectStorage`] reports URL expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryStyle {
    /// `expires_at` is set on the signed URL.
    #[default]
    Explicit,
    /// Only the S3 query parameters carry it.
    AmzQuery,
    /// Nothing does.
    Opaque,
}

/// In-process storage that mints URLs under `base_url`.
#[derive(Debug)]
pub struct MemoryObjectStorage {
    base_url: String,
    style: ExpiryStyle,
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            style: ExpiryStyle::default(),
            objects: DashMap::new(),
        }
    }

    pub fn with_expiry_style(mut self, style: ExpiryStyle) -> Self {
        self.style = style;
        self
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<SignedUrl> {
        if !self.objects.contains_key(key) {
            return Err(EvtagError::Storage(format!("object {key} not found")));
        }
        let now = Utc::now();
        let base = format!("{}/{key}", self.base_url);
        Ok(match self.style {
            ExpiryStyle::Explicit => SignedUrl {
                url: base,
                expires_at: Some(now + chrono::Duration::seconds(ttl.as_secs() as i64)),
            },
            ExpiryStyle::AmzQuery => SignedUrl {
                url: format!(
                    "{base}?X-Amz-Date={}&X-Amz-Expires={}",
                    now.format(AMZ_DATE_FORMAT),
                    ttl.as_secs()
                ),
                expires_at: None,
            },
            ExpiryStyle::Opaque => SignedUrl {
                url: base,
                expires_at: None,
            },
        })
    }
}
