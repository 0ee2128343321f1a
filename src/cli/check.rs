//! `vendup check`: report which packages have a newer upstream version.

use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::{BatchMode, BatchRunner, write_json_report};
use crate::cli::common::{
    CommandContext, ensure_no_failures, find_all_packages, print_reports, resolve_package_paths,
};

/// Check packages for updates without modifying anything.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Package directories or glob patterns, relative to the root.
    #[arg(value_name = "PATHS")]
    paths: Vec<String>,

    /// Check every package below the root.
    #[arg(long, conflicts_with = "paths")]
    all: bool,

    /// Also write the results as JSON to this file.
    #[arg(long, value_name = "FILE")]
    json_output: Option<PathBuf>,

    /// Seconds to wait between starting consecutive packages.
    #[arg(long, value_name = "SECS")]
    delay: Option<u64>,

    /// How many packages to check at once.
    #[arg(long, value_name = "N")]
    max_parallel: Option<usize>,
}

impl CheckCommand {
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let packages = if self.all {
            find_all_packages(&ctx.root)?
        } else {
            resolve_package_paths(&ctx.root, &self.paths)?
        };
        if packages.is_empty() {
            bail!("No packages to check; pass package paths or --all");
        }

        let mut runner =
            BatchRunner::new(ctx.config.clone())?.with_delay(self.delay.map(Duration::from_secs));
        if let Some(max_parallel) = self.max_parallel {
            runner = runner.with_max_parallel(max_parallel);
        }

        let reports = runner.run(packages, BatchMode::Check).await;
        print_reports(&ctx, &reports);
        if let Some(path) = &self.json_output {
            write_json_report(path, &ctx.root, &reports)?;
        }
        ensure_no_failures(&reports)
    }
}
