//! Integration test suite for vendup
//!
//! End-to-end tests that drive the `vendup` binary against local git
//! upstreams. No network access is needed.
//!
//! # Running
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Organization
//!
//! - **check**: staleness reports, JSON output, failure exit codes
//! - **update**: swaps, patch failures, downstream commits, exclusion
//! - **validate**: local modification reports

#[path = "../common/mod.rs"]
mod common;

mod check;
mod update;
mod validate;
