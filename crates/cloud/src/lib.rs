//! Artifact store implementations.
//!
//! - [`s3::S3Store`]: Amazon S3 (or compatible) bucket, optional key prefix
//! - [`local::LocalStore`]: directory on the local filesystem
//!
//! [`open_store`] picks one from a parsed [`StoreLocation`].

pub mod local;
pub mod s3;

use std::sync::Arc;

use cloudmusic_core::storage::{ArtifactStore, StoreLocation};

pub use local::LocalStore;
pub use s3::S3Store;

/// Build the store named by `location`.
///
/// S3 credentials and region come from the standard AWS provider chain
/// (environment, profile, instance metadata).
pub async fn open_store(location: &StoreLocation) -> Arc<dyn ArtifactStore> {
    match location {
        StoreLocation::S3 { bucket, prefix } => {
            Arc::new(S3Store::from_env(bucket.clone(), prefix.clone()).await)
        }
        StoreLocation::Local { root } => Arc::new(LocalStore::new(root.clone())),
    }
}
