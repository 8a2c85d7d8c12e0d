//! Asset download
//!
//! Fetches shot and audio-track source files over HTTP into the job's
//! scratch directory. Downloads are sequential per job; concurrency comes
//! from the worker pool, not from parallel fetches within one job.

use std::path::Path;

use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// HTTP client for pulling source media
pub struct AssetFetcher {
    client: Client,
}

impl AssetFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`, creating parent directories as needed.
    ///
    /// A non-2xx response or an empty body is a fetch error; the caller
    /// fails the whole job on the first asset that cannot be retrieved.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url = %url, dest = %dest.display(), "downloading asset");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "asset {url} returned HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("reading body of {url} failed: {e}")))?;
        if body.is_empty() {
            return Err(Error::Fetch(format!("asset {url} has empty body")));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &body).await?;

        debug!(url = %url, bytes = body.len(), "asset downloaded");
        Ok(())
    }
}
