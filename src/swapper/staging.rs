//! The staging directory a new tree is built in.
//!
//! It lives next to the package as `.<name>.vendup-staging`. Creating it is
//! atomic and fails when it already exists, which makes it the exclusion
//! token between concurrent runs on the same package. Dropping the guard
//! removes the directory unless the tree was handed over with [`StagingDir::release`].

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::STAGING_SUFFIX;
use crate::core::UpdaterError;
use crate::utils::fs::remove_dir_all;

/// `<parent>/.<name>.<suffix>` for the package at `package`.
#[must_use]
pub fn sibling_path(package: &Path, suffix: &str) -> PathBuf {
    let name = package.file_name().map_or_else(|| "package".into(), |n| n.to_string_lossy());
    let parent = package.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{name}.{suffix}"))
}

#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    /// Claims the staging directory of `package`.
    pub fn acquire(package: &Path) -> Result<Self, UpdaterError> {
        let path = sibling_path(package, STAGING_SUFFIX);
        match std::fs::create_dir(&path) {
            Ok(()) => Ok(Self {
                path,
                armed: true,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(UpdaterError::UpdateInProgress {
                    package: package.display().to_string(),
                    staging: path.display().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gives up ownership; the directory is no longer removed on drop.
    pub fn release(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = remove_dir_all(&self.path)
        {
            warn!("Failed to remove staging directory {}: {e:#}", self.path.display());
        }
    }
}
