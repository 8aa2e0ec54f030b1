//! Partially written download files.

use crate::error::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;

const PART_SUFFIX: &str = ".part";

/// A `<target>.part` file that is removed on drop unless committed.
///
/// Interrupted or failed downloads therefore never leave a half-written
/// file at the target path, and never leave the `.part` file behind.
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    target: PathBuf,
    cleanup: bool,
}

impl PartialFile {
    /// Creates (or truncates) the `.part` sibling of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Io`] if the file cannot be created.
    pub async fn create(target: &Path) -> Result<(Self, File)> {
        let mut name = target
            .file_name()
            .map_or_else(OsString::new, ToOwned::to_owned);
        name.push(PART_SUFFIX);
        let path = target.with_file_name(name);

        let file = File::create(&path).await?;
        Ok((
            Self {
                path,
                target: target.to_path_buf(),
                cleanup: true,
            },
            file,
        ))
    }

    /// Path of the `.part` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the finished file into place and returns the target path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Io`] if the rename fails; the `.part`
    /// file is removed in that case.
    pub async fn commit(mut self) -> Result<PathBuf> {
        tokio::fs::rename(&self.path, &self.target).await?;
        self.cleanup = false;
        Ok(std::mem::take(&mut self.target))
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.cleanup {
            match std::fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(path = %self.path.display(), "removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove partial download"
                ),
            }
        }
    }
}
