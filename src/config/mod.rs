//! Configuration management for vendup
//!
//! vendup reads a single optional TOML file. It is looked up in this order:
//!
//! 1. the `--config <FILE>` command-line flag
//! 2. the `VENDUP_CONFIG` environment variable
//! 3. `~/.vendup/config.toml` (`%LOCALAPPDATA%\vendup\config.toml` on Windows)
//!
//! When none exists the built-in defaults apply. The file never affects which
//! packages are processed; it only tunes how they are updated:
//!
//! ```toml
//! [preservation]
//! extra = ["BUILD.gn"]
//!
//! [patches]
//! dir = "patches"
//! suffix = ".diff"
//!
//! [network]
//! max_retries = 5
//! github_token_env = "GITHUB_TOKEN"
//!
//! [process]
//! timeout_secs = 300
//!
//! [[regenerators]]
//! descriptor = "BUILD.gn"
//! marker = "generated by gn-gen"
//! command = "./gn-gen"
//!
//! [downstream]
//! build_command = "make -j8"
//! ```

mod updater;

pub use updater::{
    BatchConfig, CONFIG_ENV_VAR, DEFAULT_PRESERVED_PATTERNS, DownstreamConfig, HookConfig,
    NetworkConfig, PatchConfig, PreservationConfig, ProcessConfig, RegeneratorConfig,
    UpdaterConfig,
};
