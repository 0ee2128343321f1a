//! `vendup validate`: show local modifications of a package.
//!
//! The recorded upstream version is fetched into a scratch directory and
//! compared with the package using `git diff --no-index --stat`. Entries the
//! updater preserves across updates are local by definition and are left out
//! of the comparison on both sides.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use glob::Pattern;
use std::path::{Path, PathBuf};

use crate::cli::common::CommandContext;
use crate::metadata::MetadataStore;
use crate::planner::{PlanOptions, PlanOutcome, UpdatePlanner};
use crate::process::ExternalCommand;
use crate::swapper::PackageSwapper;
use crate::upstream::{Upstream, UpstreamClient};
use crate::utils::fs::{TempDir, copy_entry, ensure_dir, remove_entry};
use crate::utils::platform::get_git_command;
use crate::utils::progress::ProgressBar;

/// Compare a package with its recorded upstream version.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Package directory, relative to the root.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

impl ValidateCommand {
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let package = if self.path.is_absolute() { self.path.clone() } else { ctx.root.join(&self.path) };
        let metadata = MetadataStore::load(&package)?;
        let upstream = Upstream::from_metadata(&metadata)?;
        let name = metadata.display_name();

        let client = UpstreamClient::new(&ctx.config.network)?;
        let options = PlanOptions {
            refresh: true,
            ..PlanOptions::default()
        };
        let target = UpdatePlanner::resolve(&client, &upstream, &metadata, &options, &name).await?;
        let plan = match UpdatePlanner::plan(&metadata, &upstream, target, &options, &ctx.config)? {
            PlanOutcome::Update(plan) => plan,
            PlanOutcome::UpToDate {
                current, ..
            } => bail!("Cannot locate upstream content for recorded version {current}"),
        };

        let spinner = ProgressBar::new_spinner(format!("Fetching {name} {}", plan.new_version()));

        let scratch = TempDir::new("validate")?;
        let upstream_tree = scratch.path().join("upstream");
        let local_tree = scratch.path().join("local");
        ensure_dir(&upstream_tree)?;
        ensure_dir(&local_tree)?;

        let swapper = PackageSwapper::new(client, &ctx.config);
        swapper.fetch(plan.source(), &upstream_tree, &name).await?;
        spinner.finish_and_clear();

        let patterns = compile_patterns(plan.preserve())?;
        remove_matching(&upstream_tree, &patterns)?;
        copy_unmatched(&package, &local_tree, &patterns)?;

        let output = ExternalCommand::new(get_git_command())
            .args(["diff", "--no-index", "--stat", "--", "upstream", "local"])
            .current_dir(scratch.path())
            .with_context(&name)
            .output()
            .await?;

        println!("{} ({} {})", name.bold(), upstream.describe(), plan.new_version());
        match output.code {
            Some(0) => println!("  {}", "No local modifications.".green()),
            Some(1) => {
                println!("  {}", "Local modifications:".yellow());
                for line in output.stdout.lines() {
                    println!("  {line}");
                }
            }
            _ => bail!("git diff failed: {}", output.failure_summary()),
        }
        Ok(())
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("Invalid preservation pattern '{p}'")))
        .collect()
}

fn top_level_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        entries.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
    }
    Ok(entries)
}

fn remove_matching(dir: &Path, patterns: &[Pattern]) -> Result<()> {
    for (name, path) in top_level_entries(dir)? {
        if patterns.iter().any(|p| p.matches(&name)) {
            remove_entry(&path)?;
        }
    }
    Ok(())
}

fn copy_unmatched(src: &Path, dst: &Path, patterns: &[Pattern]) -> Result<()> {
    for (name, path) in top_level_entries(src)? {
        if !patterns.iter().any(|p| p.matches(&name)) {
            copy_entry(&path, &dst.join(&name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserved_entries_left_out() {
        let temp = tempfile::tempdir().unwrap();
        let package = temp.path().join("package");
        let upstream = temp.path().join("upstream");
        let local = temp.path().join("local");
        for dir in [&package, &upstream, &local] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(package.join("METADATA.toml"), "").unwrap();
        std::fs::write(package.join("main.c"), "local").unwrap();
        std::fs::create_dir_all(package.join("patches")).unwrap();
        std::fs::write(upstream.join("LICENSE"), "").unwrap();
        std::fs::write(upstream.join("main.c"), "upstream").unwrap();

        let patterns =
            compile_patterns(&["METADATA.toml".to_string(), "patches".to_string(), "LICENSE".to_string()])
                .unwrap();
        remove_matching(&upstream, &patterns).unwrap();
        copy_unmatched(&package, &local, &patterns).unwrap();

        assert!(!upstream.join("LICENSE").exists());
        assert!(upstream.join("main.c").exists());
        assert_eq!(std::fs::read_to_string(local.join("main.c")).unwrap(), "local");
        assert!(!local.join("METADATA.toml").exists());
        assert!(!local.join("patches").exists());
    }
}
