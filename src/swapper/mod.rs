//! Executes an [`UpdatePlan`] against a package directory.
//!
//! The new tree is assembled in a staging directory next to the package and
//! only swapped in once everything else has succeeded:
//!
//! ```text
//! Fetching -> Preserving -> Regenerating -> Patching -> PostHooking -> Swapping -> Done
//!     \____________\_____________\______________\____________\______ Aborted
//! ```
//!
//! Every step before `Swapping` works on the staging directory only, runs
//! under one package-level timeout and, on failure, drops the staging guard.
//! The package directory is therefore byte-for-byte untouched by any failed or
//! cancelled run. `Swapping` is two renames (package to a retired sibling,
//! staging to package) followed by deleting the retired copy. If the second
//! rename fails the first is undone; only when that also fails is
//! [`UpdaterError::SwapFailure`] reported and manual recovery needed.

pub mod collaborators;
pub mod preserve;
pub mod staging;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::archive;
use crate::config::UpdaterConfig;
use crate::constants::RETIRED_SUFFIX;
use crate::core::{UpdaterError, classify};
use crate::git;
use crate::metadata::{MetadataStore, MetadataUpdate};
use crate::planner::{PlannedSource, UpdatePlan};
use crate::upstream::{UpstreamClient, with_retry};
use crate::utils::fs::remove_dir_all;

pub use collaborators::{
    CommandRegenerator, DescriptorRegenerator, GitPatchApplier, PatchApplier, PostUpdateHook,
    ShellHook,
};
pub use staging::{StagingDir, sibling_path};

/// Pipeline position of a running update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    Fetching,
    Preserving,
    Regenerating,
    Patching,
    PostHooking,
    Swapping,
    Done,
    Aborted,
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Preserving => "preserving",
            Self::Regenerating => "regenerating",
            Self::Patching => "patching",
            Self::PostHooking => "post-update hook",
            Self::Swapping => "swapping",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a completed update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    pub package: PathBuf,
    pub old_version: String,
    pub new_version: String,
    /// Top-level entries copied from the old tree.
    pub preserved: Vec<String>,
    pub regenerated: bool,
    pub patches_applied: usize,
    pub hook_ran: bool,
    pub refresh_only: bool,
}

struct Tracker<'a> {
    context: &'a str,
    state: SwapState,
}

impl Tracker<'_> {
    fn enter(&mut self, next: SwapState) {
        debug!(target: "swap", "{}: {} -> {next}", self.context, self.state);
        self.state = next;
    }
}

#[derive(Default)]
struct Prepared {
    preserved: Vec<String>,
    regenerated: bool,
    patches_applied: usize,
    hook_ran: bool,
}

/// Runs update plans. Cheap to share between tasks.
#[derive(Clone)]
pub struct PackageSwapper {
    client: UpstreamClient,
    package_timeout: Duration,
    patcher: Arc<dyn PatchApplier>,
    regenerator: Arc<dyn DescriptorRegenerator>,
    hook_runner: Arc<dyn PostUpdateHook>,
}

impl PackageSwapper {
    /// A swapper using the external-process collaborators.
    #[must_use]
    pub fn new(client: UpstreamClient, config: &UpdaterConfig) -> Self {
        let timeout = config.process.timeout();
        Self {
            client,
            package_timeout: config.process.package_timeout(),
            patcher: Arc::new(GitPatchApplier::new(timeout)),
            regenerator: Arc::new(CommandRegenerator::new(config.regenerators.clone(), timeout)),
            hook_runner: Arc::new(ShellHook::new(timeout)),
        }
    }

    #[must_use]
    pub fn with_patch_applier(mut self, patcher: Arc<dyn PatchApplier>) -> Self {
        self.patcher = patcher;
        self
    }

    #[must_use]
    pub fn with_regenerator(mut self, regenerator: Arc<dyn DescriptorRegenerator>) -> Self {
        self.regenerator = regenerator;
        self
    }

    #[must_use]
    pub fn with_post_update_hook(mut self, hook_runner: Arc<dyn PostUpdateHook>) -> Self {
        self.hook_runner = hook_runner;
        self
    }

    #[must_use]
    pub const fn with_package_timeout(mut self, timeout: Duration) -> Self {
        self.package_timeout = timeout;
        self
    }

    /// Applies `plan`. The staged tree already carries the updated metadata record.
    pub async fn execute(&self, plan: &UpdatePlan) -> Result<SwapReport> {
        let package = plan.package_dir();
        if !package.is_dir() {
            return Err(anyhow!("Package directory {} does not exist", package.display()));
        }
        let context = package
            .file_name()
            .map_or_else(|| package.display().to_string(), |n| n.to_string_lossy().into_owned());

        let staging = StagingDir::acquire(package)?;
        let mut tracker = Tracker {
            context: &context,
            state: SwapState::Fetching,
        };
        info!("{context}: updating {} -> {}", plan.old_version(), plan.new_version());

        let built = tokio::time::timeout(
            self.package_timeout,
            self.build_new_tree(plan, staging.path(), &mut tracker),
        )
        .await
        .unwrap_or_else(|_| {
            Err(UpdaterError::ProcessTimeout {
                command: format!("update of {}", package.display()),
                seconds: self.package_timeout.as_secs(),
            }
            .into())
        });

        let prepared = match built {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("{context}: aborted while {}: {e:#}", tracker.state);
                tracker.enter(SwapState::Aborted);
                return Err(e);
            }
        };

        tracker.enter(SwapState::Swapping);
        swap_trees(package, staging)?;

        tracker.enter(SwapState::Done);
        info!("{context}: now at {}", plan.new_version());

        Ok(SwapReport {
            package: package.to_path_buf(),
            old_version: plan.old_version().to_string(),
            new_version: plan.new_version().to_string(),
            preserved: prepared.preserved,
            regenerated: prepared.regenerated,
            patches_applied: prepared.patches_applied,
            hook_ran: prepared.hook_ran,
            refresh_only: plan.refresh_only(),
        })
    }

    async fn build_new_tree(
        &self,
        plan: &UpdatePlan,
        new_tree: &Path,
        tracker: &mut Tracker<'_>,
    ) -> Result<Prepared> {
        let old_tree = plan.package_dir();
        let mut prepared = Prepared::default();

        self.fetch(plan.source(), new_tree, tracker.context).await?;

        tracker.enter(SwapState::Preserving);
        prepared.preserved = preserve::carry_over(old_tree, new_tree, plan.preserve())?;
        debug!("{}: preserved {:?}", tracker.context, prepared.preserved);

        tracker.enter(SwapState::Regenerating);
        prepared.regenerated = self.regenerator.regenerate(old_tree, new_tree).await?;

        tracker.enter(SwapState::Patching);
        for patch in plan.patches() {
            self.patcher.apply(new_tree, patch).await?;
            prepared.patches_applied += 1;
        }

        tracker.enter(SwapState::PostHooking);
        if let Some(hook) = plan.post_update_hook() {
            self.hook_runner.run(hook, old_tree, new_tree).await?;
            prepared.hook_ran = true;
        }

        // The local record replaces any METADATA.toml shipped by upstream
        MetadataStore::write_update(
            &MetadataStore::path_for(old_tree),
            &MetadataStore::path_for(new_tree),
            &metadata_update(plan),
        )?;

        Ok(prepared)
    }

    /// Materializes `source` into the existing empty directory `new_tree`.
    pub async fn fetch(&self, source: &PlannedSource, new_tree: &Path, context: &str) -> Result<()> {
        match source {
            PlannedSource::Git {
                url,
                rev,
            } => git::fetch_tree(url, rev, new_tree, context).await.map_err(|e| {
                match classify(&e) {
                    UpdaterError::GitCommandError {
                        stderr, ..
                    } => UpdaterError::FetchFailure {
                        location: format!("{url}@{rev}"),
                        reason: stderr,
                    }
                    .into(),
                    _ => e,
                }
            }),
            PlannedSource::Archive {
                asset, ..
            } => {
                let what = format!("{context}: download {}", asset.name);
                with_retry(self.client.network(), &what, || {
                    archive::fetch_into(&self.client, asset, new_tree)
                })
                .await
            }
        }
    }
}

fn metadata_update(plan: &UpdatePlan) -> MetadataUpdate {
    let replace_url = match plan.source() {
        PlannedSource::Archive {
            asset, ..
        } if plan.upstream().rewrites_url() && asset.url != plan.upstream().address() => {
            Some((plan.upstream().address().to_string(), asset.url.clone()))
        }
        _ => None,
    };
    MetadataUpdate {
        version: plan.new_version().to_string(),
        date: (!plan.keep_date()).then(|| Local::now().date_naive()),
        replace_url,
    }
}

/// Replaces `package` with the staged tree.
fn swap_trees(package: &Path, staging: StagingDir) -> Result<()> {
    let retired = sibling_path(package, RETIRED_SUFFIX);
    // Leftover from an earlier run whose cleanup failed
    remove_dir_all(&retired)?;

    std::fs::rename(package, &retired).with_context(|| {
        format!("Failed to move {} aside; the package is unchanged", package.display())
    })?;

    if let Err(e) = std::fs::rename(staging.path(), package) {
        if let Err(rollback) = std::fs::rename(&retired, package) {
            let staged = staging.release();
            return Err(UpdaterError::SwapFailure {
                package: package.display().to_string(),
                retired: retired.display().to_string(),
                staged: staged.display().to_string(),
                reason: format!("{e}; restoring the previous tree failed: {rollback}"),
            }
            .into());
        }
        return Err(anyhow::Error::new(e).context(format!(
            "Failed to move the new tree into {}; the previous tree was restored",
            package.display()
        )));
    }
    staging.release();

    if let Err(e) = remove_dir_all(&retired) {
        warn!("Swapped {} but could not delete {}: {e:#}", package.display(), retired.display());
    }
    Ok(())
}
