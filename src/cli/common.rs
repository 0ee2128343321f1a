//! Helpers shared by the CLI commands: package discovery and report output.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::batch::{PackageReport, PackageStatus};
use crate::config::UpdaterConfig;
use crate::constants::METADATA_FILE;
use crate::core::ErrorContext;
use crate::utils::platform::normalize_path_separator;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: UpdaterConfig,
    /// Base for relative package paths.
    pub root: PathBuf,
}

impl CommandContext {
    /// `path` relative to the root when below it, for display.
    #[must_use]
    pub fn display_path(&self, path: &Path) -> String {
        normalize_path_separator(path.strip_prefix(&self.root).unwrap_or(path))
    }
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expands package arguments into directories.
///
/// Relative arguments are resolved against `root`. Arguments containing glob
/// metacharacters must match at least one directory; plain paths are passed
/// through so that a missing package is reported like any other failure.
/// Duplicates are dropped, first occurrence wins.
pub fn resolve_package_paths(root: &Path, args: &[String]) -> Result<Vec<PathBuf>> {
    let mut packages: Vec<PathBuf> = Vec::new();
    for arg in args {
        let absolute = if Path::new(arg).is_absolute() {
            PathBuf::from(arg)
        } else {
            root.join(arg)
        };

        if !has_glob_meta(arg) {
            if !packages.contains(&absolute) {
                packages.push(absolute);
            }
            continue;
        }

        let pattern = absolute.to_string_lossy();
        let mut matched: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid package pattern '{arg}'"))?
            .filter_map(std::result::Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        if matched.is_empty() {
            bail!("Pattern '{arg}' does not match any directory");
        }
        matched.sort();
        for path in matched {
            if !packages.contains(&path) {
                packages.push(path);
            }
        }
    }
    Ok(packages)
}

/// Finds every package below `root`.
///
/// A package is a directory containing the metadata record; the walk does not
/// descend into packages or hidden directories. Results are sorted
/// case-insensitively.
pub fn find_all_packages(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Root {} is not a directory", root.display());
    }

    let mut packages = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let hidden = entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            walker.skip_current_dir();
            continue;
        }
        if entry.path().join(METADATA_FILE).is_file() {
            packages.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    packages.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    Ok(packages)
}

/// Drops packages whose directory name or root-relative path is in `excludes`.
#[must_use]
pub fn exclude_packages(root: &Path, packages: Vec<PathBuf>, excludes: &[String]) -> Vec<PathBuf> {
    if excludes.is_empty() {
        return packages;
    }
    packages
        .into_iter()
        .filter(|package| {
            let name = package.file_name().map(|n| n.to_string_lossy().into_owned());
            let relative = package.strip_prefix(root).unwrap_or(package);
            let excluded = excludes.iter().any(|e| {
                name.as_deref() == Some(e.as_str()) || relative == Path::new(e) || package == Path::new(e)
            });
            if excluded {
                tracing::info!("Excluding {}", package.display());
            }
            !excluded
        })
        .collect()
}

/// Prints one status block per package to stdout.
pub fn print_reports(ctx: &CommandContext, reports: &[PackageReport]) {
    for report in reports {
        let name = ctx.display_path(&report.package);
        match &report.status {
            PackageStatus::UpToDate {
                current,
                latest,
            } => {
                println!("{}", name.bold());
                println!("  Current version: {current}");
                println!("  Latest version: {}", latest.as_deref().unwrap_or(current));
                println!("  {}", "Up to date.".green());
            }
            PackageStatus::OutOfDate {
                current,
                latest,
            } => {
                println!("{}", name.bold());
                println!("  Current version: {current}");
                println!("  Latest version: {latest}");
                println!("  {}", "Out of date!".red().bold());
            }
            PackageStatus::Updated {
                report: swap,
                downstream_error,
            } => {
                println!("{}", name.bold());
                if swap.refresh_only {
                    println!("  {} {}", "Refreshed at".green(), swap.new_version);
                } else {
                    println!(
                        "  {} {} -> {}",
                        "Updated".green(),
                        swap.old_version,
                        swap.new_version
                    );
                }
                if !swap.preserved.is_empty() {
                    println!("  Preserved: {}", swap.preserved.join(", "));
                }
                if swap.patches_applied > 0 {
                    println!("  Patches applied: {}", swap.patches_applied);
                }
                if let Some(error) = downstream_error {
                    println!("  {}: {error}", "warning".yellow());
                }
            }
            PackageStatus::Failed {
                error,
                message,
            } => {
                eprintln!("{}", name.bold());
                let mut error_ctx = ErrorContext::new(error.clone());
                if *message != error.to_string() {
                    error_ctx = error_ctx.with_details(message.clone());
                }
                error_ctx.display();
            }
        }
    }
}

/// Fails when any package failed, so the process exits non-zero.
pub fn ensure_no_failures(reports: &[PackageReport]) -> Result<()> {
    let failed = reports.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        bail!("{failed} of {} packages failed", reports.len());
    }
    Ok(())
}
