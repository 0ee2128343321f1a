//! Global constants used throughout the vendup codebase.
//!
//! This module contains timeout durations, retry parameters, well-known file
//! names and other numeric constants used across multiple modules. The
//! user-tunable ones are only defaults: [`crate::config::UpdaterConfig`]
//! overrides them.

use std::time::Duration;

/// Name of the per-package metadata record, read from the package root.
pub const METADATA_FILE: &str = "METADATA.toml";

/// Default directory (relative to the package root) holding local patches.
pub const DEFAULT_PATCHES_DIR: &str = "patches";

/// Default suffix of patch files inside [`DEFAULT_PATCHES_DIR`].
pub const DEFAULT_PATCH_SUFFIX: &str = ".diff";

/// Default name of the optional post-update hook at the package root.
pub const DEFAULT_POST_UPDATE_HOOK: &str = "post_update.sh";

/// Suffix of the sibling directory used to build the new tree.
///
/// The presence of `.<name>.vendup-staging` next to a package marks the
/// package as mid-update; a second run refuses to proceed while it exists.
pub const STAGING_SUFFIX: &str = "vendup-staging";

/// Suffix of the sibling directory the old tree is parked in during the swap.
pub const RETIRED_SUFFIX: &str = "vendup-old";

/// Branch created by the downstream collaborator before committing an update.
pub const DEFAULT_UPDATE_BRANCH: &str = "vendup_auto_upgrade";

/// Default timeout for a single network request (30 seconds).
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first failed upstream query.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Starting delay for exponential backoff between upstream retries (500ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 500;

/// Maximum backoff delay between upstream retries (8 seconds).
pub const MAX_BACKOFF_DELAY_MS: u64 = 8_000;

/// Timeout for a single external process (patch, regeneration, hook).
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for every pre-swap step of one package combined (30 minutes).
///
/// When it expires the run is aborted before the swap, so the old tree stays
/// in place.
pub const PACKAGE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Timeout for git operations that talk to a remote (`ls-remote`, `fetch`).
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for cloning an upstream repository.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(600);

/// Minimum number of parallel package workers regardless of CPU count.
pub const MIN_PARALLELISM: usize = 4;

/// Multiplier applied to CPU core count for default parallelism.
///
/// Workers are network bound, so running more of them than cores is fine;
/// going much higher trips upstream rate limits.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Number of leading descriptor lines searched for a regeneration marker.
pub const DEFAULT_MARKER_LINES: usize = 5;

/// User agent sent with every HTTP request (GitHub rejects requests without one).
pub const USER_AGENT: &str = concat!("vendup/", env!("CARGO_PKG_VERSION"));

/// Default GitHub REST API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default crates.io base URL.
pub const CRATES_IO_URL: &str = "https://crates.io";

/// Default number of parallel workers for this machine.
pub fn default_parallelism() -> usize {
    let cores = std::thread::available_parallelism().map_or(FALLBACK_CORE_COUNT, |n| n.get());
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}
