//! vendup CLI entry point
//!
//! Parses the command line, runs the command and renders failures with
//! context and suggestions. Commands:
//! - `check` - report packages with a newer upstream version
//! - `update` - update packages to a newer upstream version
//! - `validate` - show local modifications of a package

use anyhow::Result;
use clap::Parser;
use vendup::cli;
use vendup::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
