//! Artifact store contract and location parsing.
//!
//! The store is the only durable state of a batch. Its existence check is
//! the idempotency gate, so implementations must make a write visible
//! all-or-nothing: an object is either absent or complete.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure talking to an artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("existence check for '{key}' failed: {reason}")]
    Exists { key: String, reason: String },

    #[error("write of '{key}' failed: {reason}")]
    Write { key: String, reason: String },

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable key/value storage for generated artifacts and ledgers.
///
/// Implementations must provide read-after-write visibility within one
/// process: `exists(k)` issued after a successful `put(k, ..)` returns `true`.
/// Overwrites are allowed and last-writer-wins.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether a complete object is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Store the contents of the local file at `path` under `key`.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })?;
        self.put(key, bytes, content_type).await
    }

    /// Human-readable location for logs, e.g. `s3://bucket/prefix`.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where artifacts live, parsed from a location string.
///
/// - `s3://bucket` or `s3://bucket/some/prefix` selects S3
/// - anything else is treated as a local directory path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    S3 { bucket: String, prefix: String },
    Local { root: PathBuf },
}

impl StoreLocation {
    pub fn parse(location: &str) -> Result<Self, CoreError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(CoreError::Validation("store location is empty".into()));
        }

        if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(CoreError::Validation(format!(
                    "store location '{location}' has no bucket name"
                )));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(Self::Local {
            root: PathBuf::from(path),
        })
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{bucket}"),
            Self::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
            Self::Local { root } => write!(f, "{}", root.display()),
        }
    }
}

/// Join a key under an optional prefix with exactly one `/` between them.
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
