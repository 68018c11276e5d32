//! Host filesystem access used while preparing mount points

use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{DriverError, Result};

/// Filesystem operations the mount manager depends on
#[async_trait]
pub trait HostFs: Send + Sync {
    /// Whether `path` exists and is a block special file.
    ///
    /// A missing path is an error; an existing non-block path is `Ok(false)`.
    async fn is_block_device(&self, path: &Path) -> Result<bool>;

    async fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a directory tree; a missing directory is not an error
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// The real host filesystem
#[derive(Debug, Default, Clone)]
pub struct LocalFs;

#[async_trait]
impl HostFs for LocalFs {
    async fn is_block_device(&self, path: &Path) -> Result<bool> {
        // Follows symlinks: /dev/disk/by-id entries point at the real node
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            DriverError::Validation(format!("could not stat device {}: {}", path.display(), e))
        })?;
        Ok(metadata.file_type().is_block_device())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            DriverError::Command {
                command: format!("mkdir -p {}", path.display()),
                status: "failed".to_string(),
                output: e.to_string(),
            }
        })
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::Command {
                command: format!("rm -rf {}", path.display()),
                status: "failed".to_string(),
                output: e.to_string(),
            }),
        }
    }
}
