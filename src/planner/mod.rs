//! Update planning.
//!
//! The planner turns a package's recorded state plus what its upstream offers
//! into either an [`UpdatePlan`] or [`PlanOutcome::UpToDate`]. Staleness is
//! decided only through [`VersionResolver::compare`]: a candidate is newer
//! exactly when it compares greater than the recorded version, and an
//! ambiguous comparison is reported instead of guessed.
//!
//! [`UpdatePlanner::resolve`] performs the network lookups (with retry) and
//! [`UpdatePlanner::plan`] makes the decision. The latter only reads the
//! package directory, so it can be tested without any upstream.

use anyhow::Result;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::archive::ArchiveSelector;
use crate::config::UpdaterConfig;
use crate::core::UpdaterError;
use crate::metadata::PackageMetadata;
use crate::upstream::{
    Asset, Resolution, SourceRef, UpdateCandidate, Upstream, UpstreamClient, with_retry,
};
use crate::version::{VersionIdentifier, VersionOrder, VersionResolver};

/// Whether a candidate should replace the recorded version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Newer,
    /// Not newer, but the caller asked to update anyway.
    Forced,
    UpToDate,
}

/// How the versions of one upstream are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionScheme {
    /// [`VersionResolver::compare`]: numbers first, differing suffixes are incomparable.
    #[default]
    Structured,
    /// Semver precedence when both sides are valid semver, so `2.0.0-rc.1 < 2.0.0`.
    Semver,
}

impl VersionScheme {
    #[must_use]
    pub const fn of(upstream: &Upstream) -> Self {
        match upstream {
            Upstream::CratesRelease(_) => Self::Semver,
            Upstream::CommitTracked(_) | Upstream::ArchiveRelease(_) => Self::Structured,
        }
    }

    /// Orders `candidate` relative to `recorded`.
    #[must_use]
    pub fn order(self, candidate: &VersionIdentifier, recorded: &VersionIdentifier) -> VersionOrder {
        if self == Self::Semver
            && let (Some(c), Some(r)) = (as_semver(candidate), as_semver(recorded))
        {
            return match c.cmp_precedence(&r) {
                Ordering::Greater => VersionOrder::Greater,
                Ordering::Equal => VersionOrder::Equal,
                Ordering::Less => VersionOrder::Less,
            };
        }
        VersionResolver::compare(candidate, recorded)
    }
}

fn as_semver(version: &VersionIdentifier) -> Option<semver::Version> {
    semver::Version::parse(version.as_str().trim_start_matches('v')).ok()
}

/// Compares a candidate against the recorded version.
///
/// A candidate older than the recorded version is not an update, even when
/// forced. An equal or incomparable one is only taken when `force` is set.
pub fn decide(
    recorded: &VersionIdentifier,
    candidate: &VersionIdentifier,
    scheme: VersionScheme,
    force: bool,
) -> Result<Staleness, UpdaterError> {
    match scheme.order(candidate, recorded) {
        VersionOrder::Greater => Ok(Staleness::Newer),
        VersionOrder::Equal | VersionOrder::Incomparable if force => Ok(Staleness::Forced),
        VersionOrder::Equal | VersionOrder::Less => Ok(Staleness::UpToDate),
        VersionOrder::Incomparable => Err(UpdaterError::VersionParseError {
            version: candidate.to_string(),
            reason: format!("cannot be ordered against the recorded version {recorded}"),
        }),
    }
}

/// Caller choices that shape a plan.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Explicit target version.
    pub target_version: Option<String>,
    /// Re-fetch the recorded version instead of looking for a newer one.
    pub refresh: bool,
    /// Leave the recorded update date alone.
    pub keep_date: bool,
    /// Update even when the upstream has nothing newer.
    pub force: bool,
}

/// What the upstream offered, as input to [`UpdatePlanner::plan`].
#[derive(Debug, Clone)]
pub enum Target {
    /// Result of asking for the newest version.
    Latest(Resolution),
    /// A caller-requested version that the upstream confirmed.
    Requested(UpdateCandidate),
    /// The recorded version, fetched again.
    Refresh(UpdateCandidate),
}

/// The content a plan installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedSource {
    Git { url: String, rev: String },
    Archive { tag: String, asset: Asset },
}

/// An immutable description of one package update.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    package_dir: PathBuf,
    upstream: Upstream,
    old_version: VersionIdentifier,
    new_version: VersionIdentifier,
    source: PlannedSource,
    patches: Vec<PathBuf>,
    preserve: Vec<String>,
    post_update_hook: Option<PathBuf>,
    refresh_only: bool,
    keep_date: bool,
}

impl UpdatePlan {
    #[must_use]
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    #[must_use]
    pub const fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    #[must_use]
    pub const fn old_version(&self) -> &VersionIdentifier {
        &self.old_version
    }

    #[must_use]
    pub const fn new_version(&self) -> &VersionIdentifier {
        &self.new_version
    }

    #[must_use]
    pub const fn source(&self) -> &PlannedSource {
        &self.source
    }

    /// Patch files in application order.
    #[must_use]
    pub fn patches(&self) -> &[PathBuf] {
        &self.patches
    }

    /// Glob patterns of top-level entries carried over from the old tree.
    #[must_use]
    pub fn preserve(&self) -> &[String] {
        &self.preserve
    }

    #[must_use]
    pub fn post_update_hook(&self) -> Option<&Path> {
        self.post_update_hook.as_deref()
    }

    #[must_use]
    pub const fn refresh_only(&self) -> bool {
        self.refresh_only
    }

    #[must_use]
    pub const fn keep_date(&self) -> bool {
        self.keep_date
    }

    /// Disables the post-update hook for this run.
    #[must_use]
    pub fn without_post_update_hook(mut self) -> Self {
        self.post_update_hook = None;
        self
    }
}

/// Result of planning one package.
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Update(Box<UpdatePlan>),
    /// Nothing to do. `latest` is the newest upstream version when one was found.
    UpToDate {
        current: String,
        latest: Option<String>,
    },
}

pub struct UpdatePlanner;

impl UpdatePlanner {
    /// Asks the upstream for the target the options call for.
    ///
    /// A requested or refreshed version the upstream does not have is an
    /// [`UpdaterError::OverrideRejected`].
    pub async fn resolve(
        client: &UpstreamClient,
        upstream: &Upstream,
        metadata: &PackageMetadata,
        options: &PlanOptions,
        context: &str,
    ) -> Result<Target> {
        let network = client.network();
        let what = format!("{context}: {}", upstream.describe());

        let exact = |version: String| {
            let what = what.clone();
            async move {
                let found = with_retry(network, &what, || {
                    upstream.resolve_exact(client, &version, context)
                })
                .await?;
                found.ok_or_else(|| {
                    anyhow::Error::from(UpdaterError::OverrideRejected {
                        requested: version.clone(),
                        recorded: metadata.version.clone(),
                        reason: format!("{} has no such version", upstream.describe()),
                    })
                })
            }
        };

        if options.refresh {
            return Ok(Target::Refresh(exact(metadata.version.clone()).await?));
        }
        let current = VersionIdentifier::parse(&metadata.version)?;
        if let Some(version) = &options.target_version {
            let candidate = exact(version.clone()).await?;
            if let (
                Upstream::CommitTracked(git),
                VersionIdentifier::Commit(recorded),
                VersionIdentifier::Commit(requested),
            ) = (upstream, &current, &candidate.version)
                && recorded != requested
            {
                let descends = with_retry(network, &what, || {
                    git.descends_from(requested, recorded, context)
                })
                .await?;
                if !descends {
                    return Err(UpdaterError::OverrideRejected {
                        requested: requested.clone(),
                        recorded: recorded.clone(),
                        reason: "it does not descend from the recorded commit".to_string(),
                    }
                    .into());
                }
            }
            return Ok(Target::Requested(candidate));
        }

        let resolution =
            with_retry(network, &what, || upstream.resolve_latest(client, &current, context))
                .await?;
        if options.force && resolution == Resolution::NoUpdateAvailable {
            debug!("{context}: nothing newer upstream, forcing a refresh of {current}");
            return Ok(Target::Refresh(exact(metadata.version.clone()).await?));
        }
        Ok(Target::Latest(resolution))
    }

    /// Decides what to do with `target`.
    pub fn plan(
        metadata: &PackageMetadata,
        upstream: &Upstream,
        target: Target,
        options: &PlanOptions,
        config: &UpdaterConfig,
    ) -> Result<PlanOutcome, UpdaterError> {
        let recorded = VersionIdentifier::parse(&metadata.version)?;
        let scheme = VersionScheme::of(upstream);

        let (candidate, refresh_only) = match target {
            Target::Refresh(candidate) => (candidate, true),
            Target::Requested(candidate) => {
                match scheme.order(&candidate.version, &recorded) {
                    VersionOrder::Equal if !options.force => {
                        return Ok(up_to_date(&recorded, Some(&candidate)));
                    }
                    VersionOrder::Less => {
                        return Err(UpdaterError::OverrideRejected {
                            requested: candidate.version.to_string(),
                            recorded: recorded.to_string(),
                            reason: "it is older than the recorded version".to_string(),
                        });
                    }
                    // The caller chose the target explicitly
                    VersionOrder::Equal | VersionOrder::Greater | VersionOrder::Incomparable => {
                        (candidate, false)
                    }
                }
            }
            Target::Latest(Resolution::NoUpdateAvailable) => {
                return Ok(up_to_date(&recorded, None));
            }
            Target::Latest(Resolution::Candidate(candidate)) => {
                match decide(&recorded, &candidate.version, scheme, options.force)? {
                    Staleness::Newer | Staleness::Forced => (candidate, false),
                    Staleness::UpToDate => return Ok(up_to_date(&recorded, Some(&candidate))),
                }
            }
        };

        let package_dir = metadata.package_dir().to_path_buf();
        let source = planned_source(upstream, candidate.source)?;
        let new_version = if refresh_only {
            recorded.clone()
        } else {
            candidate.version
        };
        debug!("{}: planning {recorded} -> {new_version}", package_dir.display());

        let hook = package_dir.join(&config.hooks.post_update);
        Ok(PlanOutcome::Update(Box::new(UpdatePlan {
            patches: list_patches(&package_dir.join(&config.patches.dir), &config.patches.suffix)?,
            preserve: config.preserved_patterns(),
            post_update_hook: hook.is_file().then_some(hook),
            package_dir,
            upstream: upstream.clone(),
            old_version: recorded,
            new_version,
            source,
            refresh_only,
            keep_date: options.keep_date,
        })))
    }
}

fn up_to_date(recorded: &VersionIdentifier, candidate: Option<&UpdateCandidate>) -> PlanOutcome {
    PlanOutcome::UpToDate {
        current: recorded.to_string(),
        latest: candidate.map(|c| c.version.to_string()),
    }
}

/// Narrows a release down to the single asset closest to the one used last time.
fn planned_source(upstream: &Upstream, source: SourceRef) -> Result<PlannedSource, UpdaterError> {
    match source {
        SourceRef::Git { url, rev } => Ok(PlannedSource::Git { url, rev }),
        SourceRef::Release { tag, assets } => {
            let previous = match upstream {
                Upstream::ArchiveRelease(release) => release.previous_asset_name().to_string(),
                Upstream::CommitTracked(_) | Upstream::CratesRelease(_) => String::new(),
            };
            let asset = ArchiveSelector::select_asset(&previous, &assets).cloned().ok_or_else(
                || UpdaterError::FetchFailure {
                    location: upstream.describe(),
                    reason: format!("release {tag} has no asset in a supported format"),
                },
            )?;
            Ok(PlannedSource::Archive { tag, asset })
        }
    }
}

/// Patch files with `suffix` directly inside `dir`, sorted by file name.
fn list_patches(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, UpdaterError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut patches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix))
        })
        .collect();
    patches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(patches)
}
