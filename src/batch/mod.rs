//! Checks or updates many packages concurrently.
//!
//! Packages are independent: each task works on its own directory and
//! upstream, bounded by a semaphore. Tasks never share mutable state; each one
//! returns the report for its own slot and the coordinator assembles them, in
//! input order, once every task has finished. A failing, panicking or
//! cancelled task only affects its own report.

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::UpdaterConfig;
use crate::core::{UpdaterError, classify};
use crate::downstream::{Downstream, DownstreamOptions, run_all};
use crate::git;
use crate::metadata::MetadataStore;
use crate::planner::{PlanOptions, PlanOutcome, UpdatePlanner};
use crate::swapper::{PackageSwapper, SwapReport};
use crate::upstream::{Upstream, UpstreamClient};
use crate::utils::fs::atomic_write;
use crate::utils::platform::normalize_path_separator;
use crate::utils::progress::ProgressBar;

/// What to do with each package.
#[derive(Debug, Clone)]
pub enum BatchMode {
    /// Report staleness without touching anything.
    Check,
    Update(UpdateOptions),
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub plan: PlanOptions,
    pub skip_post_update: bool,
    pub downstream: DownstreamOptions,
}

/// Outcome for one package.
#[derive(Debug)]
pub enum PackageStatus {
    UpToDate {
        current: String,
        latest: Option<String>,
    },
    OutOfDate {
        current: String,
        latest: String,
    },
    Updated {
        report: SwapReport,
        /// Failure of a post-swap step; the update itself stands.
        downstream_error: Option<String>,
    },
    Failed {
        error: UpdaterError,
        /// Full message including context.
        message: String,
    },
}

#[derive(Debug)]
pub struct PackageReport {
    pub package: PathBuf,
    pub status: PackageStatus,
}

impl PackageReport {
    fn failed(package: PathBuf, error: &anyhow::Error) -> Self {
        Self {
            package,
            status: PackageStatus::Failed {
                error: classify(error),
                message: format!("{error:#}"),
            },
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, PackageStatus::Failed { .. })
    }

    /// Entry of the machine-readable report.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match &self.status {
            PackageStatus::UpToDate {
                current,
                latest,
            } => json!({ "current": current, "latest": latest.as_ref().unwrap_or(current) }),
            PackageStatus::OutOfDate {
                current,
                latest,
            } => json!({ "current": current, "latest": latest }),
            PackageStatus::Updated {
                report,
                downstream_error,
            } => {
                let mut entry = json!({
                    "current": report.old_version,
                    "latest": report.new_version,
                });
                if let Some(error) = downstream_error {
                    entry["downstream_error"] = json!(error);
                }
                entry
            }
            PackageStatus::Failed {
                message, ..
            } => json!({ "error": message }),
        }
    }
}

/// Writes `reports` as one JSON object keyed by package path, sorted by key.
///
/// Keys are relative to `base` when the package lies below it.
pub fn write_json_report(path: &Path, base: &Path, reports: &[PackageReport]) -> Result<()> {
    let mut entries: Vec<(String, Value)> = reports
        .iter()
        .map(|r| {
            let key = r.package.strip_prefix(base).unwrap_or(&r.package);
            (normalize_path_separator(key), r.to_json())
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let object: Map<String, Value> = entries.into_iter().collect();

    let mut content = serde_json::to_string_pretty(&Value::Object(object))?;
    content.push('\n');
    atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write JSON report to {}", path.display()))
}

/// Shared state of one batch.
#[derive(Clone)]
struct Worker {
    config: Arc<UpdaterConfig>,
    client: UpstreamClient,
    swapper: PackageSwapper,
    downstream: Option<Arc<dyn Downstream>>,
}

pub struct BatchRunner {
    worker: Worker,
    max_parallel: usize,
    delay: Option<Duration>,
}

impl BatchRunner {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        let client = UpstreamClient::new(&config.network)?;
        let swapper = PackageSwapper::new(client.clone(), &config);
        let max_parallel = config.batch.effective_parallelism();
        Ok(Self {
            worker: Worker {
                config: Arc::new(config),
                client,
                swapper,
                downstream: None,
            },
            max_parallel,
            delay: None,
        })
    }

    /// Overrides the configured parallelism; at least one task runs.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Pause between starting consecutive packages.
    #[must_use]
    pub const fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    /// Post-update collaborator, run for updated packages inside a git work tree.
    #[must_use]
    pub fn with_downstream(mut self, downstream: Arc<dyn Downstream>) -> Self {
        self.worker.downstream = Some(downstream);
        self
    }

    #[must_use]
    pub const fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Processes `packages` and returns one report per package, in input order.
    pub async fn run(&self, packages: Vec<PathBuf>, mode: BatchMode) -> Vec<PackageReport> {
        let shared = Arc::new(self.worker.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let progress = ProgressBar::new(packages.len() as u64);
        let mode = Arc::new(mode);
        debug!("Processing {} packages, {} at a time", packages.len(), self.max_parallel);

        let mut handles = Vec::with_capacity(packages.len());
        for (index, package) in packages.iter().enumerate() {
            if index > 0
                && let Some(delay) = self.delay
            {
                tokio::time::sleep(delay).await;
            }
            let worker = Arc::clone(&shared);
            let semaphore = Arc::clone(&semaphore);
            let mode = Arc::clone(&mode);
            let package = package.clone();
            let progress = progress.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                progress.set_message(package.display().to_string());
                let report = worker.process(package, &mode).await;
                progress.inc(1);
                report
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (handle, package) in handles.into_iter().zip(packages) {
            let report = match handle.await {
                Ok(report) => report,
                Err(join_error) => {
                    warn!("Task for {} did not complete: {join_error}", package.display());
                    PackageReport::failed(
                        package,
                        &anyhow::anyhow!("package task did not complete: {join_error}"),
                    )
                }
            };
            reports.push(report);
        }
        progress.finish_and_clear();
        reports
    }
}

impl Worker {
    async fn process(&self, package: PathBuf, mode: &BatchMode) -> PackageReport {
        match self.process_inner(&package, mode).await {
            Ok(status) => PackageReport {
                package,
                status,
            },
            Err(e) => {
                debug!("{}: {e:#}", package.display());
                PackageReport::failed(package, &e)
            }
        }
    }

    async fn process_inner(&self, package: &Path, mode: &BatchMode) -> Result<PackageStatus> {
        let metadata = MetadataStore::load(package)?;
        let upstream = Upstream::from_metadata(&metadata)?;
        let context = metadata.display_name();

        let options = match mode {
            BatchMode::Check => PlanOptions::default(),
            BatchMode::Update(update) => update.plan.clone(),
        };
        let target =
            UpdatePlanner::resolve(&self.client, &upstream, &metadata, &options, &context).await?;

        let plan = match UpdatePlanner::plan(&metadata, &upstream, target, &options, &self.config)? {
            PlanOutcome::UpToDate {
                current,
                latest,
            } => {
                return Ok(PackageStatus::UpToDate {
                    current,
                    latest,
                });
            }
            PlanOutcome::Update(plan) => *plan,
        };

        let update = match mode {
            BatchMode::Check => {
                return Ok(PackageStatus::OutOfDate {
                    current: plan.old_version().to_string(),
                    latest: plan.new_version().to_string(),
                });
            }
            BatchMode::Update(update) => update,
        };

        let plan = if update.skip_post_update { plan.without_post_update_hook() } else { plan };
        let report = self.swapper.execute(&plan).await?;

        let downstream_error = match &self.downstream {
            Some(downstream) if git::is_inside_work_tree(package).await => {
                run_all(downstream.as_ref(), update.downstream, package, &report)
                    .await
                    .err()
                    .map(|e| {
                        warn!("{context}: updated, but a downstream step failed: {e:#}");
                        format!("{e:#}")
                    })
            }
            _ => None,
        };

        Ok(PackageStatus::Updated {
            report,
            downstream_error,
        })
    }
}
