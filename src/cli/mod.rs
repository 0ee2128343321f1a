//! Command-line interface for vendup.
//!
//! vendup keeps vendored third-party packages in sync with their upstream
//! sources. Every package is a directory holding a `METADATA.toml` record that
//! names its upstream and the version currently vendored.
//!
//! # Available Commands
//!
//! - `check` - Report which packages have a newer upstream version
//! - `update` - Replace packages with their newest (or a requested) upstream version
//! - `validate` - Show how a package differs from its recorded upstream version
//!
//! # Usage
//!
//! ```bash
//! # Which packages under external/ are stale?
//! vendup --root external check --all
//!
//! # Update two packages, without running the build command
//! vendup update external/zlib 'external/rust/crates/*' --no-build
//!
//! # Pin a package to a specific release
//! vendup update external/zlib --version v1.3.1
//!
//! # Machine-readable results
//! vendup check --all --json-output report.json
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: only errors are logged
//! - `--config <FILE>`: alternative configuration file
//! - `--root <DIR>`: base directory for package paths (`VENDUP_ROOT`)
//! - `--no-progress`: no progress bars or spinners
//!
//! `RUST_LOG` always takes precedence over `--verbose` and `--quiet`.

mod check;
pub mod common;
mod update;
mod validate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::UpdaterConfig;
use crate::utils::progress::disable_progress;
use common::CommandContext;

/// Process-wide settings derived from the global flags.
///
/// Kept separate from [`Cli`] so tests can run commands with an injected
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset. `None` means `warn`.
    pub log_level: Option<String>,
    pub no_progress: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Base for relative package paths. `None` means the working directory.
    pub root: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global tracing subscriber and progress settings.
    ///
    /// Safe to call more than once; only the first subscriber wins.
    pub fn apply(&self) {
        if self.no_progress {
            disable_progress();
        }

        let level = self.log_level.as_deref().unwrap_or("warn");
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Loads the updater configuration and resolves the package root.
    pub async fn command_context(&self) -> Result<CommandContext> {
        let config = UpdaterConfig::load(self.config_path.as_deref()).await?;
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Cannot determine the working directory")?,
        };
        Ok(CommandContext {
            config,
            root,
        })
    }
}

#[derive(Parser)]
#[command(
    name = "vendup",
    about = "Keep vendored third-party packages in sync with upstream",
    version,
    long_about = "vendup checks and updates vendored third-party packages. Each package \
                  records its upstream and current version in METADATA.toml; updates \
                  preserve local files, re-apply local patches and swap the new tree in \
                  only after every step succeeded."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging, including every git and external command.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    ///
    /// Defaults to `$VENDUP_CONFIG`, then `~/.vendup/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory relative package paths are resolved against.
    #[arg(long, global = true, env = "VENDUP_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Disable progress bars and spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check packages for newer upstream versions.
    ///
    /// Never modifies anything on disk. See [`check::CheckCommand`].
    Check(check::CheckCommand),

    /// Update packages to a newer upstream version.
    ///
    /// See [`update::UpdateCommand`].
    Update(update::UpdateCommand),

    /// Show local modifications relative to the recorded upstream version.
    ///
    /// See [`validate::ValidateCommand`].
    Validate(validate::ValidateCommand),
}

impl Cli {
    /// Runs the parsed command with settings taken from the global flags.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translates the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
            root: self.root.clone(),
        }
    }

    /// Runs the parsed command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply();
        let ctx = config.command_context().await?;

        match self.command {
            Commands::Check(cmd) => cmd.execute(ctx).await,
            Commands::Update(cmd) => cmd.execute(ctx).await,
            Commands::Validate(cmd) => cmd.execute(ctx).await,
        }
    }
}
