//! Version identifiers of vendored packages.
//!
//! Upstreams use wildly different version schemes, so vendup does not assume
//! semver. A recorded version is one of:
//!
//! - a [`VersionIdentifier::Commit`]: a full hexadecimal commit hash, used by
//!   packages that track the tip of a branch
//! - a [`VersionIdentifier::Structured`] version: an arbitrary non-digit
//!   prefix, a run of integers separated by `.`, `-` or `_`, and an arbitrary
//!   suffix (`v1.2.3`, `zlib-1.3.1`, `release_2023_04_01-lts`)
//!
//! Ordering rules live in [`comparison`].
//!
//! ```rust,no_run
//! use vendup::version::{VersionOrder, VersionResolver};
//!
//! # fn example() -> Result<(), vendup::core::UpdaterError> {
//! let recorded = VersionResolver::parse("v1.9")?;
//! let candidate = VersionResolver::parse("v1.10")?;
//! assert_eq!(VersionResolver::compare(&candidate, &recorded), VersionOrder::Greater);
//! # Ok(())
//! # }
//! ```

pub mod comparison;

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::core::UpdaterError;

pub use comparison::{VersionOrder, VersionResolver};

static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9a-f]{40}|[0-9a-f]{64})$").expect("static regex")
});

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>[^\d]*)(?P<version>\d+(?:[._-]\d+)*)(?P<suffix>.*)$")
        .expect("static regex")
});

/// A `prefix + numbers + suffix` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuredVersion {
    pub prefix: String,
    pub segments: Vec<u64>,
    pub suffix: String,
    /// The text this was parsed from, used when writing it back.
    pub original: String,
}

impl StructuredVersion {
    /// Whether two versions share prefix and suffix and can be ordered.
    #[must_use]
    pub fn is_comparable_with(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.suffix == other.suffix
    }
}

/// A parsed version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionIdentifier {
    /// A full commit hash. Commits are never ordered by content.
    Commit(String),
    Structured(StructuredVersion),
}

impl VersionIdentifier {
    /// Parses `text` as a commit hash or a structured version.
    pub fn parse(text: &str) -> Result<Self, UpdaterError> {
        let text = text.trim();

        if COMMIT_RE.is_match(text) {
            return Ok(Self::Commit(text.to_string()));
        }

        let caps = VERSION_RE.captures(text).ok_or_else(|| UpdaterError::VersionParseError {
            version: text.to_string(),
            reason: "neither a commit hash nor a numbered version".to_string(),
        })?;

        let segments = caps["version"]
            .split(['.', '-', '_'])
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| UpdaterError::VersionParseError {
                version: text.to_string(),
                reason: format!("numeric segment out of range: {e}"),
            })?;

        Ok(Self::Structured(StructuredVersion {
            prefix: caps["prefix"].to_string(),
            segments,
            suffix: caps["suffix"].to_string(),
            original: text.to_string(),
        }))
    }

    #[must_use]
    pub const fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }

    /// The version as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Commit(sha) => sha,
            Self::Structured(v) => &v.original,
        }
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `text` is a full commit hash.
#[must_use]
pub fn is_commit_hash(text: &str) -> bool {
    COMMIT_RE.is_match(text.trim())
}
