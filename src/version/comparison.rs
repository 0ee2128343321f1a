//! Ordering of [`VersionIdentifier`]s.
//!
//! The order is partial on purpose. Two structured versions are only ordered
//! when prefix and suffix are identical; `v1.2.3` against `rel-1.2.3`, or
//! `1.0-beta` against `1.0`, is [`VersionOrder::Incomparable`] and the caller
//! has to decide what to do. Commit hashes are not ordered at all: a different
//! commit is always considered newer.

use std::cmp::Ordering;

use super::{StructuredVersion, VersionIdentifier};
use crate::core::UpdaterError;

/// Result of comparing two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl VersionOrder {
    /// The standard ordering, when there is one.
    #[must_use]
    pub const fn as_ordering(self) -> Option<Ordering> {
        match self {
            Self::Less => Some(Ordering::Less),
            Self::Equal => Some(Ordering::Equal),
            Self::Greater => Some(Ordering::Greater),
            Self::Incomparable => None,
        }
    }
}

impl From<Ordering> for VersionOrder {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

/// Parsing and comparison entry points.
pub struct VersionResolver;

impl VersionResolver {
    /// Parses a version string. See [`VersionIdentifier::parse`].
    pub fn parse(text: &str) -> Result<VersionIdentifier, UpdaterError> {
        VersionIdentifier::parse(text)
    }

    /// Compares `a` against `b`.
    ///
    /// For commits the result is asymmetric by design: `compare(a, b)` is
    /// `Greater` whenever the hashes differ, because the engine tracks a moving
    /// branch tip and any other commit is an update.
    #[must_use]
    pub fn compare(a: &VersionIdentifier, b: &VersionIdentifier) -> VersionOrder {
        match (a, b) {
            (VersionIdentifier::Commit(x), VersionIdentifier::Commit(y)) => {
                if x == y {
                    VersionOrder::Equal
                } else {
                    VersionOrder::Greater
                }
            }
            (VersionIdentifier::Structured(x), VersionIdentifier::Structured(y)) => {
                compare_structured(x, y)
            }
            _ => VersionOrder::Incomparable,
        }
    }

    /// Parses and compares two version strings.
    pub fn compare_str(a: &str, b: &str) -> Result<VersionOrder, UpdaterError> {
        Ok(Self::compare(&Self::parse(a)?, &Self::parse(b)?))
    }

    /// Picks the greatest of `candidates` that is comparable with `reference`.
    ///
    /// Unparseable candidates, commits and candidates with a different prefix or
    /// suffix are skipped. Among equal maxima (`1.0` and `1.0.0`) the first one
    /// listed wins. `reference` itself is not a candidate.
    #[must_use]
    pub fn latest_of<'a, I>(reference: &StructuredVersion, candidates: I) -> Option<StructuredVersion>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<StructuredVersion> = None;

        for text in candidates {
            let Ok(VersionIdentifier::Structured(candidate)) = VersionIdentifier::parse(text)
            else {
                continue;
            };
            if !candidate.is_comparable_with(reference) {
                continue;
            }
            let replace = match &best {
                None => true,
                Some(current) => compare_structured(&candidate, current) == VersionOrder::Greater,
            };
            if replace {
                best = Some(candidate);
            }
        }

        best
    }
}

fn compare_structured(a: &StructuredVersion, b: &StructuredVersion) -> VersionOrder {
    if !a.is_comparable_with(b) {
        return VersionOrder::Incomparable;
    }

    let len = a.segments.len().max(b.segments.len());
    let padded = |v: &StructuredVersion, i: usize| v.segments.get(i).copied().unwrap_or(0);

    for i in 0..len {
        match padded(a, i).cmp(&padded(b, i)) {
            Ordering::Equal => {}
            other => return other.into(),
        }
    }
    VersionOrder::Equal
}
