//! Local filesystem artifact store.
//!
//! Objects are files under a root directory; `/` in a key becomes a
//! subdirectory. Writes go to a uniquely named `.partial-*` sibling first
//! and are renamed into place, so a reader never observes a half-written
//! file under the final name.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use cloudmusic_core::storage::{ArtifactStore, StoreError};

/// Infix of in-flight temporary files.
pub const PARTIAL_MARKER: &str = ".partial-";

/// Artifact store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a key to a path under the root, refusing anything that could
    /// escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "key must be a relative path without '..'".into(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn partial_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("{PARTIAL_MARKER}{}", uuid::Uuid::new_v4()));
        target.with_file_name(name)
    }

    async fn ensure_parent(key: &str, target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(key, source))?;
        }
        Ok(())
    }

    /// Move a fully written temporary file into place.
    async fn commit(key: &str, partial: &Path, target: &Path) -> Result<(), StoreError> {
        if let Err(source) = tokio::fs::rename(partial, target).await {
            let _ = tokio::fs::remove_file(partial).await;
            return Err(io_error(key, source));
        }
        tracing::debug!(path = %target.display(), "Stored artifact");
        Ok(())
    }
}

fn io_error(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key).map_err(|e| StoreError::Exists {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Exists {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let target = self.path_for(key)?;
        Self::ensure_parent(key, &target).await?;

        let partial = Self::partial_path(&target);
        let written = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await
        }
        .await;
        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(key, source));
        }

        Self::commit(key, &partial, &target).await
    }

    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> Result<(), StoreError> {
        let target = self.path_for(key)?;
        Self::ensure_parent(key, &target).await?;

        let partial = Self::partial_path(&target);
        let copied = async {
            tokio::fs::copy(path, &partial).await?;
            // The copy must be on disk before the rename publishes it.
            tokio::fs::OpenOptions::new()
                .write(true)
                .open(&partial)
                .await?
                .sync_all()
                .await
        }
        .await;
        if let Err(source) = copied {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(key, source));
        }

        Self::commit(key, &partial, &target).await
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
