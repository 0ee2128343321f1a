//! `vendup update`: replace packages with a newer upstream version.

use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::{BatchMode, BatchRunner, UpdateOptions, write_json_report};
use crate::cli::common::{
    CommandContext, ensure_no_failures, exclude_packages, print_reports, resolve_package_paths,
};
use crate::downstream::{DownstreamOptions, GitDownstream};
use crate::planner::PlanOptions;

/// Update packages to the newest, or a requested, upstream version.
///
/// Each package is rebuilt next to the original and swapped in only when
/// every step succeeded. Packages inside a git work tree are then committed
/// on a fresh branch, built and uploaded with the configured commands.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Package directories or glob patterns, relative to the root.
    #[arg(required = true, value_name = "PATHS")]
    paths: Vec<String>,

    /// Update to this upstream version instead of the newest one.
    #[arg(long = "version", value_name = "VERSION")]
    target_version: Option<String>,

    /// Fetch the recorded version again, e.g. after changing patches.
    #[arg(long, conflicts_with = "target_version")]
    refresh: bool,

    /// Update even when the upstream has nothing newer.
    #[arg(long, conflicts_with = "refresh")]
    force: bool,

    /// Leave the recorded update date unchanged.
    #[arg(long)]
    keep_date: bool,

    /// Skip the configured build command.
    #[arg(long)]
    no_build: bool,

    /// Skip the configured upload command.
    #[arg(long)]
    no_upload: bool,

    /// Pass --no-verify to git commit.
    #[arg(long)]
    no_verify: bool,

    /// Git remote handed to the build and upload commands as VENDUP_REMOTE.
    #[arg(long, value_name = "NAME")]
    remote_name: Option<String>,

    /// Commit on the current branch instead of starting a fresh one.
    #[arg(long)]
    keep_local_changes: bool,

    /// Do not run the package's post-update hook.
    #[arg(long)]
    skip_post_update: bool,

    /// Skip packages with this directory name or path. Repeatable.
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Also write the results as JSON to this file.
    #[arg(long, value_name = "FILE")]
    json_output: Option<PathBuf>,

    /// How many packages to update at once.
    #[arg(long, value_name = "N")]
    max_parallel: Option<usize>,
}

impl UpdateCommand {
    fn options(&self) -> UpdateOptions {
        UpdateOptions {
            plan: PlanOptions {
                target_version: self.target_version.clone(),
                refresh: self.refresh,
                keep_date: self.keep_date,
                force: self.force,
            },
            skip_post_update: self.skip_post_update,
            downstream: DownstreamOptions {
                keep_local_changes: self.keep_local_changes,
                no_build: self.no_build,
                no_upload: self.no_upload,
                no_verify: self.no_verify,
            },
        }
    }

    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let packages = resolve_package_paths(&ctx.root, &self.paths)?;
        let packages = exclude_packages(&ctx.root, packages, &self.exclude);
        if packages.is_empty() {
            bail!("Every package was excluded; nothing to update");
        }
        if self.target_version.is_some() && packages.len() > 1 {
            bail!("--version can only be used with a single package, got {}", packages.len());
        }

        let options = self.options();
        let config = &ctx.config;
        let mut downstream_config = config.downstream.clone();
        if let Some(remote) = &self.remote_name {
            downstream_config.remote.clone_from(remote);
        }
        let downstream = GitDownstream::new(
            downstream_config,
            options.downstream,
            config.process.timeout(),
        );

        let mut runner = BatchRunner::new(config.clone())?.with_downstream(Arc::new(downstream));
        if let Some(max_parallel) = self.max_parallel {
            runner = runner.with_max_parallel(max_parallel);
        }

        let reports = runner.run(packages, BatchMode::Update(options)).await;
        print_reports(&ctx, &reports);
        if let Some(path) = &self.json_output {
            write_json_report(path, &ctx.root, &reports)?;
        }
        ensure_no_failures(&reports)
    }
}
