//! Steps that run after a package has been swapped: branching, committing,
//! building and uploading.
//!
//! None of these touch the package tree itself, so their failures are
//! reported but never undo an update. The default [`GitDownstream`] records
//! the change in the enclosing git repository and runs the configured build
//! and upload commands.

use anyhow::Result;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DownstreamConfig;
use crate::core::UpdaterError;
use crate::git::command_builder::GitCommand;
use crate::process::ExternalCommand;
use crate::swapper::SwapReport;

/// Caller switches for the downstream steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownstreamOptions {
    /// Commit on the current branch instead of starting the update branch.
    pub keep_local_changes: bool,
    pub no_build: bool,
    pub no_upload: bool,
    /// Skip the repository's commit hooks.
    pub no_verify: bool,
}

pub trait Downstream: Send + Sync {
    /// Gets the repository ready to record the update.
    fn prepare<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Records the swapped tree and metadata.
    fn stage<'a>(&'a self, package: &'a Path, report: &'a SwapReport) -> BoxFuture<'a, Result<()>>;

    fn build<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>>;

    fn upload<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// Runs every step the options allow, in order, stopping at the first failure.
pub async fn run_all(
    downstream: &dyn Downstream,
    options: DownstreamOptions,
    package: &Path,
    report: &SwapReport,
) -> Result<()> {
    downstream.prepare(package).await?;
    downstream.stage(package, report).await?;
    if !options.no_build {
        downstream.build(package).await?;
    }
    if !options.no_upload {
        downstream.upload(package).await?;
    }
    Ok(())
}

/// Commit message for an update.
#[must_use]
pub fn commit_message(name: &str, report: &SwapReport) -> String {
    if report.refresh_only {
        format!(
            "Refresh {name} at {}\n\nRe-fetched the recorded upstream version with vendup.",
            report.new_version
        )
    } else {
        format!(
            "Upgrade {name} to {}\n\nThis project was upgraded with vendup from {}.",
            report.new_version, report.old_version
        )
    }
}

/// Git branch and commit plus configured build and upload commands.
///
/// Git steps are serialized because packages of one batch usually share a
/// repository and its index lock.
pub struct GitDownstream {
    config: DownstreamConfig,
    options: DownstreamOptions,
    timeout: Duration,
    git_lock: Mutex<()>,
}

impl GitDownstream {
    #[must_use]
    pub fn new(config: DownstreamConfig, options: DownstreamOptions, timeout: Duration) -> Self {
        Self {
            config,
            options,
            timeout,
            git_lock: Mutex::new(()),
        }
    }

    async fn run_command(&self, command: &str, package: &Path, step: &str) -> Result<()> {
        let output = ExternalCommand::shell(command)
            .current_dir(package)
            .env("VENDUP_PACKAGE", package.display().to_string())
            .env("VENDUP_REMOTE", self.config.remote.clone())
            .with_timeout(self.timeout)
            .with_context(step)
            .output()
            .await?;
        if output.success {
            Ok(())
        } else {
            Err(UpdaterError::Other {
                message: format!("{step} command '{command}' failed: {}", output.failure_summary()),
            }
            .into())
        }
    }
}

impl Downstream for GitDownstream {
    fn prepare<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.options.keep_local_changes {
                return Ok(());
            }
            let _guard = self.git_lock.lock().await;
            GitCommand::checkout_branch(&self.config.branch, "HEAD")
                .current_dir(package)
                .with_context("downstream")
                .execute_success()
                .await?;
            debug!("On branch {} for {}", self.config.branch, package.display());
            Ok(())
        })
    }

    fn stage<'a>(&'a self, package: &'a Path, report: &'a SwapReport) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let name = package
                .file_name()
                .map_or_else(|| package.display().to_string(), |n| n.to_string_lossy().into_owned());
            let _guard = self.git_lock.lock().await;
            GitCommand::add_all(".")
                .current_dir(package)
                .with_context(&name)
                .execute_success()
                .await?;
            let mut commit = GitCommand::commit(&commit_message(&name, report));
            if self.options.no_verify {
                commit = commit.arg("--no-verify");
            }
            commit
                .current_dir(package)
                .with_context(&name)
                .execute_success()
                .await?;
            info!("Committed update of {name}");
            Ok(())
        })
    }

    fn build<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.config.build_command {
                Some(command) => self.run_command(command, package, "build").await,
                None => Ok(()),
            }
        })
    }

    fn upload<'a>(&'a self, package: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.config.upload_command {
                Some(command) => self.run_command(command, package, "upload").await,
                None => Ok(()),
            }
        })
    }
}
