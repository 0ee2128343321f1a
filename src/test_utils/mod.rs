//! Test utilities for vendup
//!
//! Helpers shared by unit tests and the integration suite: local git
//! upstreams ([`TestGit`]), package fixtures and one-time logging setup.
//! Compiled only with the `test-utils` feature or under `cfg(test)`.

pub mod fixtures;
pub mod git_helper;

pub use fixtures::{metadata_toml, tree_snapshot, write_package};
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, else `RUST_LOG`; does nothing when neither is set.
/// Safe to call from every test.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // Show targets like "git" and "swap"
            .with_thread_ids(false)
            .try_init();
    });
}
