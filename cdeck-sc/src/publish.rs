//! Artifact publishing
//!
//! Uploads the rendered video and thumbnail to object storage and turns
//! storage keys into public URLs. The store itself is a trait seam so the
//! pipeline can be tested without a storage backend.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Minimal object-store surface the pipeline needs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `key`, returning the public URL
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String>;

    /// Remove the object stored under `key`
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Object store speaking plain HTTP PUT against an S3-style gateway
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    public_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: String, public_url: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Publish(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let url = format!("{}/{key}", self.base_url);
        debug!(key = %key, bytes = bytes.len(), "uploading artifact");

        let response = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("upload of {key} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Publish(format!(
                "upload of {key} returned HTTP {status}"
            )));
        }

        Ok(format!("{}/{key}", self.public_url))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = format!("{}/{key}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("delete of {key} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Publish(format!(
                "delete of {key} returned HTTP {status}"
            )));
        }
        Ok(())
    }
}

/// Published artifact URLs for one completed job
pub struct PublishedArtifacts {
    pub video_url: String,
    pub thumbnail_url: String,
}

/// Uploads a job's output files under scene-scoped storage keys
pub struct ArtifactPublisher<S: ObjectStore + ?Sized> {
    store: std::sync::Arc<S>,
}

impl<S: ObjectStore + ?Sized> ArtifactPublisher<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    /// Upload the rendered video and thumbnail.
    ///
    /// Keys are scene-scoped and job-suffixed, so re-renders of the same
    /// scene never overwrite each other:
    /// `scenes/{scene_id}/{job_id}.mp4` and `.jpg`.
    ///
    /// If the thumbnail upload fails after the video succeeded, the video
    /// object is deleted so a failed job leaves nothing published.
    pub async fn publish(
        &self,
        scene_id: Uuid,
        job_id: &str,
        video: &Path,
        thumbnail: &Path,
    ) -> Result<PublishedArtifacts> {
        let video_bytes = tokio::fs::read(video).await?;
        let video_key = format!("scenes/{scene_id}/{job_id}.mp4");
        let video_url = self.store.upload(&video_key, "video/mp4", video_bytes).await?;

        let thumb_bytes = tokio::fs::read(thumbnail).await?;
        let thumb_key = format!("scenes/{scene_id}/{job_id}.jpg");
        let thumbnail_url = match self.store.upload(&thumb_key, "image/jpeg", thumb_bytes).await {
            Ok(url) => url,
            Err(e) => {
                if let Err(del) = self.store.delete(&video_key).await {
                    warn!(job_id = %job_id, key = %video_key, error = %del, "orphaned video left in storage");
                }
                return Err(e);
            }
        };

        info!(job_id = %job_id, video = %video_url, "artifacts published");
        Ok(PublishedArtifacts {
            video_url,
            thumbnail_url,
        })
    }
}
