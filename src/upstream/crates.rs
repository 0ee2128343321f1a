//! crates.io upstreams, for vendored Rust crates.

use anyhow::Result;
use regex::Regex;
use semver::Version;
use serde::Deserialize;
use std::sync::LazyLock;

use super::http::UpstreamClient;
use super::{Asset, Resolution, SourceRef, UpdateCandidate};
use crate::core::UpdaterError;
use crate::version::VersionIdentifier;

static CRATES_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://crates\.io/crates/([-\w]+)/?$").expect("static regex")
});

#[derive(Debug, Deserialize)]
struct VersionList {
    versions: Vec<CrateVersion>,
}

#[derive(Debug, Clone, Deserialize)]
struct CrateVersion {
    num: String,
    #[serde(default)]
    yanked: bool,
    dl_path: String,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CratesReleaseUpstream {
    homepage: String,
    name: String,
}

impl CratesReleaseUpstream {
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let caps = CRATES_URL_RE.captures(url)?;
        Some(Self {
            homepage: url.to_string(),
            name: caps[1].to_string(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn homepage(&self) -> &str {
        &self.homepage
    }

    async fn versions(&self, client: &UpstreamClient) -> Result<Vec<CrateVersion>> {
        let url = format!(
            "{}/api/v1/crates/{}/versions",
            client.network().crates_api_url.trim_end_matches('/'),
            self.name
        );
        let list: VersionList =
            client.plain_json(&url).await?.ok_or_else(|| UpdaterError::FetchFailure {
                location: url.clone(),
                reason: format!("crate '{}' does not exist", self.name),
            })?;
        Ok(list.versions)
    }

    pub async fn resolve_latest(
        &self,
        client: &UpstreamClient,
        current: &VersionIdentifier,
    ) -> Result<Resolution> {
        let versions = self.versions(client).await?;
        let Some(newest) = newest_version(&versions, current.as_str()) else {
            return Ok(Resolution::NoUpdateAvailable);
        };
        if newest.num == current.as_str() {
            return Ok(Resolution::NoUpdateAvailable);
        }
        Ok(Resolution::Candidate(self.candidate(client, newest)?))
    }

    /// Yanked versions are never offered.
    pub async fn resolve_exact(
        &self,
        client: &UpstreamClient,
        version: &str,
    ) -> Result<Option<UpdateCandidate>> {
        let versions = self.versions(client).await?;
        versions
            .iter()
            .find(|v| !v.yanked && v.num == version.trim())
            .map(|v| self.candidate(client, v))
            .transpose()
            .map_err(Into::into)
    }

    fn candidate(
        &self,
        client: &UpstreamClient,
        version: &CrateVersion,
    ) -> Result<UpdateCandidate, UpdaterError> {
        let asset = Asset {
            name: format!("{}-{}.crate", self.name, version.num),
            url: format!(
                "{}{}",
                client.network().crates_api_url.trim_end_matches('/'),
                version.dl_path
            ),
            digest: version.checksum.as_ref().map(|c| format!("sha256:{c}")),
        };
        Ok(UpdateCandidate {
            version: VersionIdentifier::parse(&version.num)?,
            source: SourceRef::Release {
                tag: version.num.clone(),
                assets: vec![asset],
            },
        })
    }
}

/// Newest non-yanked version by semver precedence.
///
/// Pre-releases are only considered when the current version is one itself.
fn newest_version<'a>(versions: &'a [CrateVersion], current: &str) -> Option<&'a CrateVersion> {
    let allow_pre = Version::parse(current).is_ok_and(|v| !v.pre.is_empty());
    versions
        .iter()
        .filter(|v| !v.yanked)
        .filter_map(|v| Version::parse(&v.num).ok().map(|parsed| (parsed, v)))
        .filter(|(parsed, _)| allow_pre || parsed.pre.is_empty())
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, v)| v)
}
