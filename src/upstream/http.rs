//! HTTP access to release APIs.
//!
//! Transport failures, timeouts, server errors and rate limiting become
//! [`UpdaterError::UpstreamUnreachable`] so that the retry layer picks them up.
//! A 404 is a regular "not found" answer, and any other client error is a
//! permanent [`UpdaterError::FetchFailure`].

use anyhow::Result;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::constants::USER_AGENT;
use crate::core::UpdaterError;

/// Shared HTTP client plus the network settings it was built from.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    network: NetworkConfig,
    github_token: Option<String>,
}

impl UpstreamClient {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(network.timeout())
            .connect_timeout(network.timeout())
            .build()
            .map_err(|e| UpdaterError::ConfigError {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            network: network.clone(),
            github_token: network.github_token(),
        })
    }

    #[must_use]
    pub const fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn github_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = &self.github_token
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// GET a GitHub API document. `Ok(None)` means 404.
    pub async fn github_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.get_json(url, self.github_headers()).await
    }

    /// GET a JSON document with default headers. `Ok(None)` means 404.
    pub async fn plain_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.get_json(url, HeaderMap::new()).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<Option<T>> {
        debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| unreachable_error(url, &e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(url, status)?;

        let body = response.text().await.map_err(|e| unreachable_error(url, &e.to_string()))?;
        let parsed = serde_json::from_str(&body).map_err(|e| UpdaterError::FetchFailure {
            location: url.to_string(),
            reason: format!("unexpected response: {e}"),
        })?;
        Ok(Some(parsed))
    }
}

/// Maps a non-success status to the matching error.
pub fn check_status(url: &str, status: StatusCode) -> Result<(), UpdaterError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return Err(unreachable_error(url, &format!("HTTP {status}")));
    }
    Err(UpdaterError::FetchFailure {
        location: url.to_string(),
        reason: format!("HTTP {status}"),
    })
}

fn unreachable_error(url: &str, reason: &str) -> UpdaterError {
    UpdaterError::UpstreamUnreachable {
        upstream: url.to_string(),
        reason: reason.to_string(),
    }
}
