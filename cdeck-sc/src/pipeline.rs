//! Composition pipeline
//!
//! Bounded intake queue, fixed worker pool, and the per-job render
//! sequence: fetch assets, cut shots, concatenate, place audio, publish
//! artifacts, notify. Workers pull from one shared channel, so a slow job
//! occupies exactly one worker while others keep draining the queue.
//!
//! Every job runs inside a scratch directory owned by a guard; the guard
//! removes the directory when the job ends, whichever way it ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdeck_common::timeline::{normalize, AudioPlan, VideoTimeline};
use cdeck_common::types::{CompositionRequest, CompositionResult, JobState};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fetch::AssetFetcher;
use crate::notify::Notifier;
use crate::publish::{ArtifactPublisher, ObjectStore};
use crate::registry::JobRegistry;
use crate::render::MediaRenderer;

/// Per-job scratch directory, removed on drop.
///
/// Drop runs on every exit path, including worker panics, so failed jobs
/// do not leak partial downloads or intermediate clips.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh directory under `root` for one job run.
    ///
    /// The name carries a random suffix so two runs reusing a job id
    /// (possible once the sweep evicts a stale entry) never share a
    /// directory, and so the name is always a plain single component
    /// regardless of what the id contains.
    pub fn create(root: &Path, job_id: &str) -> Result<Self> {
        let path = root.join(format!("{job_id}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

/// Intake side of the bounded job queue
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<CompositionRequest>,
}

impl JobQueue {
    /// Enqueue without waiting; a full queue is an immediate error so the
    /// intake handler can answer 503 instead of blocking the request.
    pub fn try_enqueue(&self, request: CompositionRequest) -> Result<()> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Queue("job queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Queue("job queue is closed".to_string())
            }
        })
    }
}

/// Shared services every worker needs
pub struct PipelineContext {
    pub registry: Arc<JobRegistry>,
    pub renderer: Arc<dyn MediaRenderer>,
    pub store: Arc<dyn ObjectStore>,
    pub fetcher: AssetFetcher,
    pub notifier: Notifier,
    pub scratch_root: PathBuf,
}

/// Spawn the worker pool and return the intake queue.
///
/// Workers share one receiver behind a mutex; the lock is held only
/// across `recv`, never while a job is processed.
pub fn start_workers(ctx: Arc<PipelineContext>, workers: usize, queue_capacity: usize) -> JobQueue {
    let (tx, rx) = mpsc::channel::<CompositionRequest>(queue_capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..workers.max(1) {
        let ctx = Arc::clone(&ctx);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            worker_loop(worker_id, ctx, rx).await;
        });
    }

    info!(workers = workers.max(1), capacity = queue_capacity.max(1), "worker pool started");
    JobQueue { tx }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<PipelineContext>,
    rx: Arc<Mutex<mpsc::Receiver<CompositionRequest>>>,
) {
    loop {
        let request = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(request) = request else {
            debug!(worker_id, "queue closed, worker exiting");
            return;
        };

        let job_id = request.job_id.clone();
        let callback_url = request.callback_url.clone();
        info!(worker_id, job_id = %job_id, "worker picked up job");

        // exactly one terminal result per job, whichever way it ends
        let result = match run_job(&ctx, request).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                ctx.registry.fail(&job_id, message.clone()).await;
                CompositionResult::failed(job_id.clone(), message)
            }
        };

        if let Err(e) = ctx.notifier.deliver(&callback_url, &result).await {
            // delivery failure never changes the job outcome
            warn!(job_id = %job_id, error = %e, "webhook delivery abandoned");
        }
    }
}

/// Run one job end to end, returning the completed result.
///
/// Any error aborts the remaining stages; the caller records the failure
/// and builds the failed result.
async fn run_job(ctx: &PipelineContext, request: CompositionRequest) -> Result<CompositionResult> {
    let job_id = request.job_id.clone();
    // intake already normalized once; redoing it here is cheap and keeps
    // the worker independent of what the handler checked
    let (timeline, audio_plan) = normalize(&request.shots, &request.audio_tracks)?;

    let scratch = ScratchDir::create(&ctx.scratch_root, &job_id)?;

    let (shot_files, track_files) =
        fetch_assets(ctx, &job_id, scratch.path(), &timeline, &audio_plan).await?;

    ctx.registry
        .transition(&job_id, JobState::Processing, "rendering shots")
        .await;

    let video = render_video(ctx, &job_id, scratch.path(), &timeline, &shot_files).await?;

    let final_video = mix_audio(
        ctx,
        &job_id,
        scratch.path(),
        &video,
        &audio_plan,
        &track_files,
        request.master_volume,
    )
    .await?;

    // thumbnail from the midpoint of the first shot
    let thumb_at = timeline.entries[0].effective_ms / 2;
    let thumbnail = scratch.path().join("thumbnail.jpg");
    ctx.renderer
        .extract_frame(&final_video, thumb_at, &thumbnail)
        .await?;

    ctx.registry
        .transition(&job_id, JobState::Uploading, "publishing artifacts")
        .await;

    let publisher = ArtifactPublisher::new(Arc::clone(&ctx.store));
    let artifacts = publisher
        .publish(request.scene_id, &job_id, &final_video, &thumbnail)
        .await?;
    ctx.registry.set_progress(&job_id, 95).await;

    ctx.registry.complete(&job_id).await;
    info!(job_id = %job_id, duration_ms = timeline.total_ms, "composition completed");

    Ok(CompositionResult::completed(
        job_id,
        artifacts.video_url,
        artifacts.thumbnail_url,
        timeline.total_ms,
    ))
}

/// Download every shot source and every surviving track source.
///
/// Muted and zero-volume tracks contribute nothing to the mix, so their
/// sources are never fetched.
async fn fetch_assets(
    ctx: &PipelineContext,
    job_id: &str,
    scratch: &Path,
    timeline: &VideoTimeline,
    audio_plan: &AudioPlan,
) -> Result<(Vec<PathBuf>, Vec<Option<PathBuf>>)> {
    ctx.registry
        .transition(job_id, JobState::Downloading, "downloading assets")
        .await;

    let audible: Vec<bool> = audio_plan
        .placements
        .iter()
        .map(|p| !p.track.muted && p.track.volume > 0.0 && p.effective_ms > 0)
        .collect();
    let total = timeline.entries.len() + audible.iter().filter(|a| **a).count();
    let mut fetched = 0usize;

    let mut shot_files = Vec::with_capacity(timeline.entries.len());
    for (i, entry) in timeline.entries.iter().enumerate() {
        let dest = scratch.join(format!("shot_{i}.src"));
        ctx.fetcher.download(&entry.shot.source_url, &dest).await?;
        shot_files.push(dest);
        fetched += 1;
        ctx.registry
            .set_progress(job_id, (fetched * 20 / total) as u8)
            .await;
    }

    let mut track_files = Vec::with_capacity(audio_plan.placements.len());
    for (i, placement) in audio_plan.placements.iter().enumerate() {
        if !audible[i] {
            debug!(job_id = %job_id, track = %placement.track.id, "skipping silent track");
            track_files.push(None);
            continue;
        }
        let dest = scratch.join(format!("track_{i}.src"));
        ctx.fetcher.download(&placement.track.source_url, &dest).await?;
        track_files.push(Some(dest));
        fetched += 1;
        ctx.registry
            .set_progress(job_id, (fetched * 20 / total) as u8)
            .await;
    }

    Ok((shot_files, track_files))
}

/// Cut each shot into a normalized clip, then concatenate in order
async fn render_video(
    ctx: &PipelineContext,
    job_id: &str,
    scratch: &Path,
    timeline: &VideoTimeline,
    shot_files: &[PathBuf],
) -> Result<PathBuf> {
    let mut clips = Vec::with_capacity(timeline.entries.len());
    let count = timeline.entries.len();

    for (i, entry) in timeline.entries.iter().enumerate() {
        let clip = scratch.join(format!("clip_{i}.mp4"));
        ctx.renderer.cut_shot(entry, &shot_files[i], &clip).await?;
        clips.push(clip);
        // cuts span the 20-60 band of the processing stage
        ctx.registry
            .set_progress(job_id, (20 + (i + 1) * 40 / count) as u8)
            .await;
    }

    let concatenated = scratch.join("scene.mp4");
    ctx.renderer.concat(&clips, &concatenated).await?;
    ctx.registry.set_progress(job_id, 65).await;
    Ok(concatenated)
}

/// Prepare surviving track stems and mix them over the video.
///
/// With no surviving stems the concatenated video is already final; the
/// mix stage is skipped entirely, leaving shot audio as recorded.
async fn mix_audio(
    ctx: &PipelineContext,
    job_id: &str,
    scratch: &Path,
    video: &Path,
    audio_plan: &AudioPlan,
    track_files: &[Option<PathBuf>],
    master_volume: f64,
) -> Result<PathBuf> {
    let mut stems: Vec<(PathBuf, u64)> = Vec::new();
    for (i, placement) in audio_plan.placements.iter().enumerate() {
        let Some(src) = &track_files[i] else {
            continue;
        };
        let stem = scratch.join(format!("stem_{i}.m4a"));
        ctx.renderer.prepare_track(placement, src, &stem).await?;
        stems.push((stem, placement.start_ms));
    }

    if stems.is_empty() {
        ctx.registry.set_progress(job_id, 75).await;
        return Ok(video.to_path_buf());
    }

    let mixed = scratch.join("scene_mixed.mp4");
    ctx.renderer.mix(video, &stems, master_volume, &mixed).await?;
    ctx.registry.set_progress(job_id, 75).await;
    Ok(mixed)
}
