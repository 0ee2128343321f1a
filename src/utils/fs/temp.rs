//! Self-cleaning scratch directories.

use crate::utils::fs::dirs::{ensure_dir, remove_dir_all};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// A uniquely named directory removed when dropped.
///
/// Used for downloads and scratch git repositories that must not outlive the
/// operation that created them, even when it fails or is cancelled.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// Creates `.vendup_<prefix>_<uuid>` under the system temp directory.
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    /// Creates `.vendup_<prefix>_<uuid>` under `parent`.
    ///
    /// Keeping scratch data on the same filesystem as the package lets the
    /// final move be a rename.
    pub fn new_in(parent: &Path, prefix: &str) -> Result<Self> {
        let unique_name = format!(".vendup_{}_{}", prefix, uuid::Uuid::new_v4());
        let path = parent.join(unique_name);

        ensure_dir(&path)?;

        Ok(Self {
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if let Err(e) = remove_dir_all(&self.path) {
            tracing::warn!("Failed to clean up {}: {e}", self.path.display());
        }
    }
}
