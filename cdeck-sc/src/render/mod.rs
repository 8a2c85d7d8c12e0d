//! Media rendering
//!
//! Trait seam between the composition pipeline and the external renderer
//! binary. The pipeline only sees `MediaRenderer`; the ffmpeg-backed
//! implementation lives in [`ffmpeg`], and tests substitute their own.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cdeck_common::timeline::{AudioPlacement, TimelineEntry};

use crate::error::Result;

/// Renderer operations the pipeline needs, one per pipeline stage.
///
/// All paths are absolute paths inside the job's scratch directory.
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    /// Render one shot's source into a normalized clip: trims applied,
    /// fades burned in, audio silenced when muted.
    async fn cut_shot(&self, entry: &TimelineEntry, src: &Path, dest: &Path) -> Result<()>;

    /// Join already-normalized clips into one video, in order
    async fn concat(&self, clips: &[PathBuf], dest: &Path) -> Result<()>;

    /// Render one audio track's source into a placed stem: trimmed to its
    /// effective duration with its volume applied.
    async fn prepare_track(&self, placement: &AudioPlacement, src: &Path, dest: &Path) -> Result<()>;

    /// Mix prepared stems over the concatenated video. Each stem comes
    /// with its start offset in milliseconds; `master_volume` scales the
    /// final mixed bed.
    async fn mix(
        &self,
        video: &Path,
        stems: &[(PathBuf, u64)],
        master_volume: f64,
        dest: &Path,
    ) -> Result<()>;

    /// Grab a single frame at `at_ms` as the thumbnail image
    async fn extract_frame(&self, video: &Path, at_ms: u64, dest: &Path) -> Result<()>;
}
