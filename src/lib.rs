//! vendup - keeps vendored third-party packages in sync with upstream.
//!
//! A vendored package is a directory holding a copy of some third-party
//! project plus a `METADATA.toml` record naming where the copy came from and
//! which version it is. vendup answers "is there something newer?" and, when
//! asked, replaces the copy with the newer upstream content while keeping the
//! local files (build descriptors, licenses, patches, hooks) and re-applying
//! local patches.
//!
//! # Pipeline
//!
//! 1. [`metadata`] loads and validates the record.
//! 2. [`upstream`] picks the authoritative upstream and asks it for the newest
//!    (or a requested) version, retrying transient network failures.
//! 3. [`version`] orders the candidate against the recorded version.
//! 4. [`planner`] turns that into an immutable [`planner::UpdatePlan`] or
//!    reports the package as up to date.
//! 5. [`swapper`] builds the new tree in a sibling staging directory, carries
//!    preserved files over, regenerates descriptors, applies patches, runs the
//!    post-update hook and only then swaps the trees and rewrites the record.
//! 6. [`batch`] runs many packages concurrently and collects one report per
//!    package; [`downstream`] commits, builds and uploads updated packages.
//!
//! Any failure before the swap leaves the original package untouched.
//!
//! # Modules
//!
//! - [`archive`] - release archive download, verification and unpacking
//! - [`cli`] - the `vendup` command-line interface
//! - [`config`] - the optional `~/.vendup/config.toml`
//! - [`core`] - error taxonomy and user-facing rendering
//! - [`git`] - git plumbing for commit-tracked upstreams
//! - [`process`] - bounded external processes
//! - [`utils`] - filesystem, platform and progress helpers

pub mod archive;
pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod downstream;
pub mod git;
pub mod metadata;
pub mod planner;
pub mod process;
pub mod swapper;
pub mod upstream;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
