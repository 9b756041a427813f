//! Release manifest fetching.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::UpdateError;

/// Bounded timeout for the manifest fetch. Update checking is best-effort
/// and must never stall startup past this.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Descriptor of the latest available release. Fetched fresh on each check,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub notes: String,
    pub url: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
}

impl Manifest {
    /// Exact string inequality against the running build's version; no
    /// semantic ordering. The publisher advances the manifest atomically
    /// with the artifact, so any difference means "offer this release",
    /// including an intentional republish of an older tag.
    pub fn differs_from(&self, running_version: &str) -> bool {
        self.version != running_version
    }
}

/// Fetches the release manifest from a fixed location.
pub struct ManifestClient {
    http: reqwest::Client,
    url: String,
}

impl ManifestClient {
    pub fn new(url: impl Into<String>) -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Fetches and parses the manifest. Any transport or parse failure
    /// yields `None`: the check silently abstains and no update is
    /// offered.
    pub async fn fetch(&self) -> Option<Manifest> {
        match self.try_fetch().await {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "manifest fetch failed, skipping update check");
                None
            }
        }
    }

    async fn try_fetch(&self) -> Result<Manifest, UpdateError> {
        let resp = self.http.get(&self.url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}
