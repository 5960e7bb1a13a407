//! Release version resolution against the release-hosting API.
//!
//! Answers two questions before anything is downloaded: what is the latest
//! published tag, and does a given tag exist. Every call is a single attempt
//! on a dedicated client with its own timeout.

use std::time::Duration;

use manifestgen_shared::{DEFAULT_API_URL, ManifestGenError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// Timeout for release API requests.
const API_TIMEOUT: Duration = Duration::from_secs(15);

/// User-Agent string for API requests (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("manifestgen/", env!("CARGO_PKG_VERSION"));

/// The subset of a release object we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    /// Release tag, e.g. `v2.3.0`.
    pub tag_name: String,
}

/// Ensure a version string carries the `v` tag prefix.
pub fn normalize_tag(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

// ---------------------------------------------------------------------------
// ReleaseClient
// ---------------------------------------------------------------------------

/// Client for the "latest release" and "release by tag" endpoints.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    client: Client,
    api_url: String,
}

impl ReleaseClient {
    /// Create a client rooted at `api_url` (e.g. `https://api.github.com/repos/org/repo`).
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| ManifestGenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Return the tag of the latest published release.
    #[instrument(skip(self), fields(api_url = %self.api_url))]
    pub async fn latest_version(&self) -> Result<String> {
        let url = format!("{}/releases/latest", self.api_url);
        let response = self.get(&url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestGenError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ManifestGenError::Network(format!("{url}: failed to read body: {e}")))?;

        let meta: ReleaseMetadata = serde_json::from_str(&body).map_err(|e| {
            ManifestGenError::Decode(format!("decoding release API response failed: {e}"))
        })?;

        info!(tag = %meta.tag_name, "resolved latest release");
        Ok(meta.tag_name)
    }

    /// Check whether `version` (with or without the `v` prefix) is a published release.
    #[instrument(skip(self), fields(api_url = %self.api_url))]
    pub async fn version_exists(&self, version: &str) -> Result<bool> {
        let tag = normalize_tag(version);
        let url = format!("{}/releases/tags/{tag}", self.api_url);
        let response = self.get(&url).await?;

        match response.status() {
            StatusCode::OK => {
                debug!(%tag, "release exists");
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                debug!(%tag, "release not found");
                Ok(false)
            }
            other => Err(ManifestGenError::UnexpectedStatus {
                status: other.as_u16(),
                url,
            }),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ManifestGenError::Network(format!("release API call failed: {url}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Default-endpoint helpers
// ---------------------------------------------------------------------------

/// Latest release tag from the default release API.
pub async fn get_latest_version() -> Result<String> {
    ReleaseClient::new(DEFAULT_API_URL)?.latest_version().await
}

/// Whether `version` exists on the default release API.
pub async fn existing_version(version: &str) -> Result<bool> {
    ReleaseClient::new(DEFAULT_API_URL)?
        .version_exists(version)
        .await
}
