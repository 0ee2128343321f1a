//! Commit-tracked upstreams: any git repository, followed by tag or branch tip.

use anyhow::Result;
use tracing::debug;

use super::{Resolution, SourceRef, UpdateCandidate};
use crate::core::{UpdaterError, classify};
use crate::git;
use crate::version::{VersionIdentifier, VersionResolver, is_commit_hash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTrackedUpstream {
    url: String,
}

impl CommitTrackedUpstream {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim().to_string(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn candidate(&self, version: VersionIdentifier, rev: String) -> UpdateCandidate {
        UpdateCandidate {
            version,
            source: SourceRef::Git {
                url: self.url.clone(),
                rev,
            },
        }
    }

    /// A recorded commit tracks the default branch tip; a recorded tag tracks
    /// the greatest comparable tag.
    pub async fn resolve_latest(
        &self,
        current: &VersionIdentifier,
        context: &str,
    ) -> Result<Resolution> {
        match current {
            VersionIdentifier::Commit(_) => {
                let head = git::remote_head(&self.url, context)
                    .await
                    .map_err(|e| self.unreachable(e))?;
                debug!(
                    "{}: default branch {} at {}",
                    self.url,
                    head.branch.as_deref().unwrap_or("HEAD"),
                    head.commit
                );
                let rev = head.commit.clone();
                Ok(Resolution::Candidate(
                    self.candidate(VersionIdentifier::Commit(head.commit), rev),
                ))
            }
            VersionIdentifier::Structured(recorded) => {
                let tags =
                    git::remote_tags(&self.url, context).await.map_err(|e| self.unreachable(e))?;
                debug!("{}: {} tags advertised", self.url, tags.len());
                let Some(latest) =
                    VersionResolver::latest_of(recorded, tags.iter().map(String::as_str))
                else {
                    return Ok(Resolution::NoUpdateAvailable);
                };
                let rev = format!("refs/tags/{}", latest.original);
                Ok(Resolution::Candidate(
                    self.candidate(VersionIdentifier::Structured(latest), rev),
                ))
            }
        }
    }

    /// Accepts a tag, a branch (pinned to its tip commit) or a fetchable commit hash.
    pub async fn resolve_exact(
        &self,
        version: &str,
        context: &str,
    ) -> Result<Option<UpdateCandidate>> {
        let version = version.trim();

        if is_commit_hash(version) {
            let exists = git::commit_exists(&self.url, version, context)
                .await
                .map_err(|e| self.unreachable(e))?;
            return Ok(exists.then(|| {
                self.candidate(VersionIdentifier::Commit(version.to_string()), version.to_string())
            }));
        }

        let refs = git::remote_refs(&self.url, context).await.map_err(|e| self.unreachable(e))?;

        if refs.iter().any(|r| r.tag_name() == Some(version)) {
            let identifier = VersionIdentifier::parse(version)?;
            return Ok(Some(self.candidate(identifier, format!("refs/tags/{version}"))));
        }

        let branch = format!("refs/heads/{version}");
        Ok(refs.into_iter().find(|r| r.name == branch).map(|r| {
            self.candidate(VersionIdentifier::Commit(r.object.clone()), r.object)
        }))
    }

    /// Whether `commit` has `recorded` in its history.
    pub async fn descends_from(&self, commit: &str, recorded: &str, context: &str) -> Result<bool> {
        git::is_ancestor(&self.url, recorded, commit, context)
            .await
            .map_err(|e| self.unreachable(e))
    }

    fn unreachable(&self, error: anyhow::Error) -> anyhow::Error {
        match classify(&error) {
            UpdaterError::GitCommandError {
                stderr, ..
            } => UpdaterError::UpstreamUnreachable {
                upstream: self.url.clone(),
                reason: stderr,
            }
            .into(),
            UpdaterError::ProcessTimeout {
                seconds, ..
            } => UpdaterError::UpstreamUnreachable {
                upstream: self.url.clone(),
                reason: format!("no answer within {seconds}s"),
            }
            .into(),
            _ => error,
        }
    }
}
