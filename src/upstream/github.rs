//! GitHub release upstreams.
//!
//! Tracks `https://github.com/<owner>/<repo>/releases/download/...` and
//! `https://github.com/<owner>/<repo>/archive/...` URLs through the releases API.
//! Each release contributes its uploaded assets plus the two source archives
//! GitHub generates for every tag.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::http::UpstreamClient;
use super::{Asset, Resolution, SourceRef, UpdateCandidate};
use crate::archive::is_supported_archive;
use crate::core::UpdaterError;
use crate::version::VersionIdentifier;

static GITHUB_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([-\w]+)/([-\w]+)/(?:releases/download/|archive/)")
        .expect("static regex")
});

#[derive(Debug, Deserialize)]
struct GhRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
struct GhAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReleaseUpstream {
    url: String,
    owner: String,
    repo: String,
}

impl ArchiveReleaseUpstream {
    /// Recognizes GitHub release-download and archive URLs.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let caps = GITHUB_URL_RE.captures(url)?;
        Some(Self {
            url: url.to_string(),
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// File name of the asset the package was last updated from.
    #[must_use]
    pub fn previous_asset_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    fn api_url(&self, client: &UpstreamClient, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/{suffix}",
            client.network().github_api_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    pub async fn resolve_latest(
        &self,
        client: &UpstreamClient,
        current: &VersionIdentifier,
    ) -> Result<Resolution> {
        let url = self.api_url(client, "latest");
        let release: GhRelease =
            client.github_json(&url).await?.ok_or_else(|| UpdaterError::FetchFailure {
                location: url.clone(),
                reason: "the repository has no published release".to_string(),
            })?;

        Ok(self.resolution(release, current)?)
    }

    /// The latest release is no update when it carries the recorded tag.
    fn resolution(
        &self,
        release: GhRelease,
        current: &VersionIdentifier,
    ) -> Result<Resolution, UpdaterError> {
        if release.tag_name == current.as_str() {
            return Ok(Resolution::NoUpdateAvailable);
        }
        Ok(Resolution::Candidate(self.candidate(release)?))
    }

    /// `Ok(None)` when no release carries the tag `version`.
    pub async fn resolve_exact(
        &self,
        client: &UpstreamClient,
        version: &str,
    ) -> Result<Option<UpdateCandidate>> {
        let url = self.api_url(client, &format!("tags/{}", version.trim()));
        match client.github_json::<GhRelease>(&url).await? {
            Some(release) => Ok(Some(self.candidate(release)?)),
            None => Ok(None),
        }
    }

    fn candidate(&self, release: GhRelease) -> Result<UpdateCandidate, UpdaterError> {
        let version = VersionIdentifier::parse(&release.tag_name)?;
        let assets = self.release_assets(&release);
        Ok(UpdateCandidate {
            version,
            source: SourceRef::Release {
                tag: release.tag_name,
                assets,
            },
        })
    }

    /// Uploaded assets followed by the generated source archives, supported formats only.
    fn release_assets(&self, release: &GhRelease) -> Vec<Asset> {
        let generated = ["tar.gz", "zip"].into_iter().map(|ext| Asset {
            name: format!("{}.{ext}", release.tag_name),
            url: format!(
                "https://github.com/{}/{}/archive/{}.{ext}",
                self.owner, self.repo, release.tag_name
            ),
            digest: None,
        });

        release
            .assets
            .iter()
            .map(|a| Asset {
                name: a.name.clone(),
                url: a.browser_download_url.clone(),
                digest: a.digest.clone(),
            })
            .chain(generated)
            .filter(|a| is_supported_archive(&a.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        let network = NetworkConfig {
            github_api_url: server.uri(),
            github_token_env: "VENDUP_TEST_NO_TOKEN".to_string(),
            ..NetworkConfig::default()
        };
        UpstreamClient::new(&network).unwrap()
    }

    fn release(json: &str) -> GhRelease {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_github_urls() {
        let upstream = ArchiveReleaseUpstream::parse(
            "https://github.com/madler/zlib/releases/download/v1.3.1/zlib-1.3.1.tar.gz",
        )
        .unwrap();
        assert_eq!(upstream.owner(), "madler");
        assert_eq!(upstream.repo(), "zlib");
        assert_eq!(upstream.previous_asset_name(), "zlib-1.3.1.tar.gz");

        let upstream =
            ArchiveReleaseUpstream::parse("https://github.com/acme/tool-x/archive/v2.0.zip").unwrap();
        assert_eq!(upstream.repo(), "tool-x");
        assert_eq!(upstream.previous_asset_name(), "v2.0.zip");

        assert!(ArchiveReleaseUpstream::parse("https://github.com/acme/tool").is_none());
        assert!(ArchiveReleaseUpstream::parse("https://gitlab.com/acme/tool/archive/v1.zip").is_none());
    }

    #[test]
    fn test_candidate_assets() {
        let upstream =
            ArchiveReleaseUpstream::parse("https://github.com/acme/proj/releases/download/v0.9/proj-0.9.tar.gz")
                .unwrap();
        let release = release(
            r#"{
                "tag_name": "v1.0",
                "assets": [
                    {"name": "proj-1.0.tar.gz", "browser_download_url": "https://dl/proj-1.0.tar.gz",
                     "digest": "sha256:abcd"},
                    {"name": "proj-1.0.exe", "browser_download_url": "https://dl/proj-1.0.exe"},
                    {"name": "proj-1.0-linux.zip", "browser_download_url": "https://dl/proj-1.0-linux.zip"}
                ]
            }"#,
        );

        let candidate = upstream.candidate(release).unwrap();
        assert_eq!(candidate.version.as_str(), "v1.0");
        let SourceRef::Release { tag, assets } = candidate.source else {
            panic!("expected a release source");
        };
        assert_eq!(tag, "v1.0");
        let names: Vec<_> = assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["proj-1.0.tar.gz", "proj-1.0-linux.zip", "v1.0.tar.gz", "v1.0.zip"]);
        assert_eq!(assets[0].digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(assets[2].url, "https://github.com/acme/proj/archive/v1.0.tar.gz");
    }

    #[test]
    fn test_unparseable_tag_is_a_version_error() {
        let upstream =
            ArchiveReleaseUpstream::parse("https://github.com/acme/proj/archive/v1.zip").unwrap();
        let err = upstream.candidate(release(r#"{"tag_name": "nightly"}"#)).unwrap_err();
        assert!(matches!(err, UpdaterError::VersionParseError { .. }));
    }

    #[test]
    fn test_same_tag_is_no_update() {
        let upstream =
            ArchiveReleaseUpstream::parse("https://github.com/acme/proj/archive/v1.0.zip").unwrap();
        let current = VersionIdentifier::parse("v1.0").unwrap();

        let same = upstream.resolution(release(r#"{"tag_name": "v1.0"}"#), &current).unwrap();
        assert_eq!(same, Resolution::NoUpdateAvailable);

        let newer = upstream.resolution(release(r#"{"tag_name": "v1.1"}"#), &current).unwrap();
        assert!(matches!(newer, Resolution::Candidate(c) if c.version.as_str() == "v1.1"));
    }

    #[tokio::test]
    async fn test_resolve_latest_against_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/proj/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"tag_name": "v1.0", "assets": [
                    {"name": "proj-1.0.tar.gz", "browser_download_url": "https://dl/proj-1.0.tar.gz"}
                ]}"#,
            ))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let upstream = ArchiveReleaseUpstream::parse(
            "https://github.com/acme/proj/releases/download/v0.9/proj-0.9.tar.gz",
        )
        .unwrap();

        let current = VersionIdentifier::parse("v1.0").unwrap();
        assert_eq!(
            upstream.resolve_latest(&client, &current).await.unwrap(),
            Resolution::NoUpdateAvailable
        );

        let current = VersionIdentifier::parse("v0.9").unwrap();
        let Resolution::Candidate(candidate) =
            upstream.resolve_latest(&client, &current).await.unwrap()
        else {
            panic!("expected a candidate");
        };
        assert_eq!(candidate.version.as_str(), "v1.0");
    }

    #[tokio::test]
    async fn test_unknown_tag_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/proj/releases/tags/v9.9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let upstream =
            ArchiveReleaseUpstream::parse("https://github.com/acme/proj/archive/v1.0.zip").unwrap();

        assert!(upstream.resolve_exact(&client, "v9.9").await.unwrap().is_none());
    }
}
