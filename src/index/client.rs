//! PyPI JSON API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::{DistFile, DistKind, PackageIndex, ReleaseInfo, Requirement, normalize_name};
use crate::retry::{check_retryable, with_retry};

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";

/// Client for the PyPI JSON API (`/pypi/{name}/json` and
/// `/pypi/{name}/{version}/json`).
pub struct PyPiClient {
    client: Client,
    index_url: String,
}

impl PyPiClient {
    #[tracing::instrument(skip(client, index_url))]
    pub fn new(client: Client, index_url: Option<String>) -> Self {
        let index_url = index_url.unwrap_or_else(|| DEFAULT_INDEX_URL.to_string());
        Self { client, index_url }
    }

    #[tracing::instrument(skip(self, url))]
    async fn fetch_release(&self, url: String) -> Result<ReleaseInfo> {
        debug!("Fetching release metadata from {}...", url);

        with_retry("Fetching release metadata", || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .context("Failed to send request to the package index")?;

                let response = response.error_for_status().map_err(check_retryable)?;

                let parsed = response
                    .json::<ProjectResponse>()
                    .await
                    .context("Failed to parse JSON response from the package index")?;

                Ok(parsed.into())
            }
        })
        .await
    }
}

#[derive(Deserialize)]
struct ProjectResponse {
    info: ProjectInfo,
    #[serde(default)]
    urls: Vec<ProjectFile>,
}

#[derive(Deserialize)]
struct ProjectInfo {
    name: String,
    version: String,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ProjectFile {
    filename: String,
    url: String,
    packagetype: String,
}

impl From<ProjectResponse> for ReleaseInfo {
    fn from(response: ProjectResponse) -> Self {
        let requires = response
            .info
            .requires_dist
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| Requirement::parse(entry))
            .collect();
        let files = response
            .urls
            .into_iter()
            .filter_map(|f| {
                let kind = match f.packagetype.as_str() {
                    "bdist_wheel" => DistKind::Wheel,
                    "sdist" => DistKind::Sdist,
                    // bdist_egg and friends are not installable here
                    _ => return None,
                };
                Some(DistFile {
                    filename: f.filename,
                    url: f.url,
                    kind,
                })
            })
            .collect();
        ReleaseInfo {
            name: normalize_name(&response.info.name),
            version: response.info.version,
            requires,
            files,
        }
    }
}

#[async_trait]
impl PackageIndex for PyPiClient {
    fn index_url(&self) -> &str {
        &self.index_url
    }

    #[tracing::instrument(skip(self))]
    async fn latest(&self, name: &str) -> Result<ReleaseInfo> {
        self.fetch_release(format!("{}/{}/json", self.index_url, name))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, name: &str, version: &str) -> Result<ReleaseInfo> {
        self.fetch_release(format!("{}/{}/{}/json", self.index_url, name, version))
            .await
    }

    #[tracing::instrument(skip(self, file))]
    async fn download(&self, file: &DistFile) -> Result<Vec<u8>> {
        debug!("Downloading {}...", file.filename);

        let response = self
            .client
            .get(&file.url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", file.filename))?
            .error_for_status()
            .map_err(check_retryable)?;

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .with_context(|| format!("Download of {} was interrupted", file.filename))?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}
