//! Local scratch files for encoded audio awaiting upload.
//!
//! A [`ScratchFile`] deletes itself when dropped, so the file goes away on
//! every exit path of a job: success, failure, or cancellation.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Local scratch I/O failure.
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    #[error("cannot create scratch directory {}: {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write scratch file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file under the scratch directory, removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Write `bytes` to a fresh file named after `name` in `dir`.
    ///
    /// The name is suffixed with a random id so workers sharing a scratch
    /// directory never collide.
    pub async fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<Self, ScratchError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ScratchError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;

        let file = Self {
            path: dir.join(format!("{}.{name}", uuid::Uuid::new_v4().simple())),
        };
        let written = async {
            let mut handle = tokio::fs::File::create(&file.path).await?;
            handle.write_all(bytes).await?;
            handle.flush().await
        }
        .await;

        // On error `file` drops here and removes whatever was written.
        written.map_err(|source| ScratchError::Write {
            path: file.path.clone(),
            source,
        })?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch file",
            ),
        }
    }
}
