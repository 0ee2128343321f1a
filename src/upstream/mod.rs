//! Upstream providers.
//!
//! A package's upstream is chosen from its metadata record: the first URL entry
//! whose kind is supported becomes the authoritative [`Upstream`], every other
//! entry is ignored for the run. The set of upstream kinds is closed, and each
//! operation dispatches over it exhaustively.
//!
//! | Metadata URL | Variant |
//! |---|---|
//! | `GIT` entry, any git-reachable address | [`Upstream::CommitTracked`] |
//! | `ARCHIVE` entry on a GitHub release or archive URL | [`Upstream::ArchiveRelease`] |
//! | `HOMEPAGE` entry on `https://crates.io/crates/<name>` | [`Upstream::CratesRelease`] |
//!
//! Providers only perform network I/O. Failures to reach the upstream surface as
//! [`UpdaterError::UpstreamUnreachable`]; [`with_retry`] retries exactly those.

mod crates;
mod git;
mod github;
mod http;

use anyhow::Result;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

use crate::config::NetworkConfig;
use crate::core::{UpdaterError, classify};
use crate::metadata::{PackageMetadata, UrlKind};
use crate::version::VersionIdentifier;

pub use crates::CratesReleaseUpstream;
pub use git::CommitTrackedUpstream;
pub use github::ArchiveReleaseUpstream;
pub use http::{UpstreamClient, check_status};

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// File name, used for selection and format detection.
    pub name: String,
    pub url: String,
    /// Published digest such as `sha256:<hex>`, when the host provides one.
    pub digest: Option<String>,
}

/// Where the content of a candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// A revision of a git repository.
    Git { url: String, rev: String },
    /// A published release and its downloadable assets.
    Release { tag: String, assets: Vec<Asset> },
}

/// A version offered by an upstream, with the means to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub version: VersionIdentifier,
    pub source: SourceRef,
}

/// Result of asking an upstream for its newest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Candidate(UpdateCandidate),
    NoUpdateAvailable,
}

/// The authoritative upstream of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    CommitTracked(CommitTrackedUpstream),
    ArchiveRelease(ArchiveReleaseUpstream),
    CratesRelease(CratesReleaseUpstream),
}

impl Upstream {
    /// Picks the first URL entry of a supported kind.
    pub fn from_metadata(metadata: &PackageMetadata) -> Result<Self, UpdaterError> {
        metadata
            .urls
            .iter()
            .find_map(|location| match &location.kind {
                UrlKind::Git => {
                    Some(Self::CommitTracked(CommitTrackedUpstream::new(&location.address)))
                }
                UrlKind::Archive => {
                    ArchiveReleaseUpstream::parse(&location.address).map(Self::ArchiveRelease)
                }
                UrlKind::Homepage => {
                    CratesReleaseUpstream::parse(&location.address).map(Self::CratesRelease)
                }
                UrlKind::Other(_) => None,
            })
            .ok_or_else(|| UpdaterError::NoSupportedUpstream {
                path: metadata.path.display().to_string(),
            })
    }

    /// Finds the newest version the upstream offers relative to `current`.
    pub async fn resolve_latest(
        &self,
        client: &UpstreamClient,
        current: &VersionIdentifier,
        context: &str,
    ) -> Result<Resolution> {
        match self {
            Self::CommitTracked(upstream) => upstream.resolve_latest(current, context).await,
            Self::ArchiveRelease(upstream) => upstream.resolve_latest(client, current).await,
            Self::CratesRelease(upstream) => upstream.resolve_latest(client, current).await,
        }
    }

    /// Looks up one specific version. `Ok(None)` means the upstream does not have it.
    pub async fn resolve_exact(
        &self,
        client: &UpstreamClient,
        version: &str,
        context: &str,
    ) -> Result<Option<UpdateCandidate>> {
        match self {
            Self::CommitTracked(upstream) => upstream.resolve_exact(version, context).await,
            Self::ArchiveRelease(upstream) => upstream.resolve_exact(client, version).await,
            Self::CratesRelease(upstream) => upstream.resolve_exact(client, version).await,
        }
    }

    /// Short display name for logs and reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CommitTracked(upstream) => format!("git {}", upstream.url()),
            Self::ArchiveRelease(upstream) => {
                format!("GitHub release {}/{}", upstream.owner(), upstream.repo())
            }
            Self::CratesRelease(upstream) => format!("crates.io {}", upstream.name()),
        }
    }

    /// The metadata URL value this upstream was built from.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::CommitTracked(upstream) => upstream.url(),
            Self::ArchiveRelease(upstream) => upstream.url(),
            Self::CratesRelease(upstream) => upstream.homepage(),
        }
    }

    /// Whether the metadata URL is rewritten to the chosen asset after an update.
    #[must_use]
    pub const fn rewrites_url(&self) -> bool {
        matches!(self, Self::ArchiveRelease(_))
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Runs `operation`, retrying with exponential backoff while it fails with a
/// retryable error.
///
/// Delays start at `initial_backoff_ms`, double on each attempt and are capped
/// at `max_backoff_ms`. At most `max_retries` retries follow the first attempt.
pub async fn with_retry<T, F, Fut>(network: &NetworkConfig, what: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let strategy = ExponentialBackoff::from_millis(2)
        .factor((network.initial_backoff_ms / 2).max(1))
        .max_delay(Duration::from_millis(network.max_backoff_ms))
        .take(network.max_retries);

    RetryIf::start(strategy, operation, |error: &anyhow::Error| {
        let retry = classify(error).is_retryable();
        if retry {
            warn!("{what}: {error:#}; retrying");
        }
        retry
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::UpstreamLocation;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metadata(urls: &[(UrlKind, &str)]) -> PackageMetadata {
        PackageMetadata {
            path: PathBuf::from("/tmp/pkg/METADATA.toml"),
            name: None,
            description: None,
            urls: urls
                .iter()
                .map(|(kind, address)| UpstreamLocation {
                    kind: kind.clone(),
                    address: (*address).to_string(),
                })
                .collect(),
            version: "v1.0".to_string(),
            last_upgrade_date: None,
            notes: None,
            license_type: None,
        }
    }

    fn fast_network(max_retries: usize) -> NetworkConfig {
        NetworkConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_first_supported_url_wins() {
        let meta = metadata(&[
            (UrlKind::Homepage, "https://example.org"),
            (UrlKind::Archive, "https://example.org/foo-1.0.tar.gz"),
            (UrlKind::Git, "https://example.org/foo.git"),
            (UrlKind::Archive, "https://github.com/acme/foo/archive/v1.0.tar.gz"),
        ]);
        let upstream = Upstream::from_metadata(&meta).unwrap();
        assert_eq!(upstream, Upstream::CommitTracked(CommitTrackedUpstream::new("https://example.org/foo.git")));
        assert_eq!(upstream.describe(), "git https://example.org/foo.git");
        assert!(!upstream.rewrites_url());
    }

    #[test]
    fn test_github_archive_and_crates_upstreams() {
        let meta = metadata(&[(
            UrlKind::Archive,
            "https://github.com/acme/foo/releases/download/v1.0/foo-1.0.tar.gz",
        )]);
        let upstream = Upstream::from_metadata(&meta).unwrap();
        assert_eq!(upstream.describe(), "GitHub release acme/foo");
        assert!(upstream.rewrites_url());

        let meta = metadata(&[(UrlKind::Homepage, "https://crates.io/crates/serde")]);
        let upstream = Upstream::from_metadata(&meta).unwrap();
        assert_eq!(upstream.describe(), "crates.io serde");
        assert_eq!(upstream.address(), "https://crates.io/crates/serde");
    }

    #[test]
    fn test_no_supported_upstream() {
        let meta = metadata(&[
            (UrlKind::Homepage, "https://example.org"),
            (UrlKind::Other("PIPER".to_string()), "https://example.org/x"),
        ]);
        let err = Upstream::from_metadata(&meta).unwrap_err();
        assert!(matches!(err, UpdaterError::NoSupportedUpstream { .. }));
    }

    #[tokio::test]
    async fn test_retry_only_retryable_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<()> = with_retry(&fast_network(3), "probe", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(UpdaterError::FetchFailure {
                    location: "x".to_string(),
                    reason: "HTTP 401".to_string(),
                }
                .into())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<()> = with_retry(&fast_network(2), "probe", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(UpdaterError::UpstreamUnreachable {
                    upstream: "x".to_string(),
                    reason: "timed out".to_string(),
                }
                .into())
            }
        })
        .await;
        assert!(classify(&result.unwrap_err()).is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let value = with_retry(&fast_network(3), "probe", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(UpdaterError::UpstreamUnreachable {
                        upstream: "x".to_string(),
                        reason: "reset".to_string(),
                    }
                    .into())
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }
}
