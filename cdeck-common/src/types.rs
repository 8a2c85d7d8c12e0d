//! Composition data model
//!
//! Wire types for the scene composer: intake requests, job status entries,
//! and the terminal result delivered to the caller's webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fade overlay applied within a shot's own duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FadeKind {
    #[default]
    None,
    Black,
    White,
}

impl FadeKind {
    /// ffmpeg fade filter color name, if this kind fades at all
    pub fn color(&self) -> Option<&'static str> {
        match self {
            FadeKind::None => None,
            FadeKind::Black => Some("black"),
            FadeKind::White => Some("white"),
        }
    }
}

/// A single ordered video clip within a scene
///
/// Millisecond fields are signed on the wire so that negative values reach
/// the timeline normalizer and are rejected there with a clear error,
/// rather than failing opaquely in deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    pub id: String,
    /// Sort key; ties broken by original array position
    pub order: i64,
    pub source_url: String,
    /// Nominal source duration in milliseconds
    pub duration_ms: i64,
    #[serde(default)]
    pub trim_start_ms: i64,
    #[serde(default)]
    pub trim_end_ms: i64,
    /// Drop the shot's own audio from the composition
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub fade_in: FadeKind,
    #[serde(default)]
    pub fade_out: FadeKind,
    /// Duration of each fade; must not exceed half the post-trim duration
    #[serde(default)]
    pub fade_duration_ms: i64,
}

/// An audio source placed at a fixed offset on the scene timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub id: String,
    pub source_url: String,
    /// Scene-relative placement offset in milliseconds
    #[serde(default)]
    pub start_ms: i64,
    /// Target duration on the timeline in milliseconds
    pub duration_ms: i64,
    /// Trim applied to the source before placement
    #[serde(default)]
    pub trim_start_ms: i64,
    #[serde(default = "default_track_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
}

fn default_track_volume() -> f64 {
    1.0
}

fn default_master_volume() -> f64 {
    1.0
}

/// Declarative timeline for one scene, submitted to `POST /compose`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequest {
    /// Caller-supplied unique job identifier
    pub job_id: String,
    pub scene_id: Uuid,
    pub project_id: Uuid,
    /// Webhook address for the terminal CompositionResult
    pub callback_url: String,
    /// Ordered shots; at least one required
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    /// Global multiplier applied as the final mixdown step, range [0, 2]
    #[serde(default = "default_master_volume")]
    pub master_volume: f64,
}

impl CompositionRequest {
    /// Structural validation performed at intake, before a job exists.
    ///
    /// Timeline-level rules (trims, orders, fades) are checked separately by
    /// the normalizer; this only rejects requests that are malformed at the
    /// envelope level.
    pub fn validate(&self) -> Result<()> {
        if self.job_id.trim().is_empty() {
            return Err(Error::InvalidRequest("jobId must not be empty".into()));
        }
        // the id names scratch directories and storage keys, so it must
        // never carry path separators or dot-segments
        if !self
            .job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidRequest(format!(
                "jobId {:?} contains characters outside [A-Za-z0-9_-]",
                self.job_id
            )));
        }
        if self.callback_url.trim().is_empty() {
            return Err(Error::InvalidRequest("callbackUrl must not be empty".into()));
        }
        if self.shots.is_empty() {
            return Err(Error::InvalidRequest("at least one shot is required".into()));
        }
        if !(0.0..=2.0).contains(&self.master_volume) {
            return Err(Error::InvalidRequest(format!(
                "masterVolume {} outside range [0, 2]",
                self.master_volume
            )));
        }
        Ok(())
    }
}

/// Job lifecycle states; transitions are strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Downloading,
    Processing,
    Uploading,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Stage-weighted progress window `(floor, ceiling)` in percent.
    ///
    /// A job entering a state reports at least the floor; progress within
    /// the state never exceeds the ceiling.
    pub fn progress_range(&self) -> (u8, u8) {
        match self {
            JobState::Queued => (0, 0),
            JobState::Downloading => (0, 20),
            JobState::Processing => (20, 80),
            JobState::Uploading => (80, 100),
            JobState::Completed => (100, 100),
            JobState::Failed => (0, 100),
        }
    }

    /// Ordinal used to enforce forward-only transitions
    pub fn ordinal(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Downloading => 1,
            JobState::Processing => 2,
            JobState::Uploading => 3,
            JobState::Completed => 4,
            JobState::Failed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Downloading => "downloading",
            JobState::Processing => "processing",
            JobState::Uploading => "uploading",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Registry entry tracking one job's lifecycle
///
/// Owned by the job registry; mutated only by the worker processing the
/// job, read by status-query callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// 0-100, monotonically non-decreasing within a job
    pub progress: u8,
    /// Human-readable description of the current stage
    pub stage: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn new(job_id: String) -> Self {
        let now = crate::time::now();
        Self {
            job_id,
            state: JobState::Queued,
            progress: 0,
            stage: "queued".to_string(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }
}

/// Terminal outcome of one job, delivered once via the caller's webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionResult {
    pub job_id: String,
    /// `completed` or `failed`
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Total rendered duration in milliseconds
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompositionResult {
    pub fn completed(job_id: String, video_url: String, thumbnail_url: String, duration_ms: u64) -> Self {
        Self {
            job_id,
            status: JobState::Completed,
            video_url: Some(video_url),
            thumbnail_url: Some(thumbnail_url),
            duration_ms,
            error: None,
        }
    }

    pub fn failed(job_id: String, error: String) -> Self {
        Self {
            job_id,
            status: JobState::Failed,
            video_url: None,
            thumbnail_url: None,
            duration_ms: 0,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(id: &str, order: i64) -> Shot {
        Shot {
            id: id.to_string(),
            order,
            source_url: format!("https://assets.test/{id}.mp4"),
            duration_ms: 5000,
            trim_start_ms: 0,
            trim_end_ms: 0,
            muted: false,
            fade_in: FadeKind::None,
            fade_out: FadeKind::None,
            fade_duration_ms: 0,
        }
    }

    fn request() -> CompositionRequest {
        CompositionRequest {
            job_id: "job-1".to_string(),
            scene_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            callback_url: "https://caller.test/hook".to_string(),
            shots: vec![shot("a", 0)],
            audio_tracks: Vec::new(),
            master_volume: 1.0,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_empty_shot_list_rejected() {
        let mut req = request();
        req.shots.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_blank_job_id_rejected() {
        let mut req = request();
        req.job_id = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_job_id_restricted_to_safe_characters() {
        let mut req = request();
        for bad in ["..", "../escape", "a/b", "a\\b", "a b", "job.id", "a\0b"] {
            req.job_id = bad.to_string();
            assert!(req.validate().is_err(), "jobId {bad:?} should be rejected");
        }
        for good in ["job-1", "JOB_2", "0a1b2c"] {
            req.job_id = good.to_string();
            assert!(req.validate().is_ok(), "jobId {good:?} should be accepted");
        }
    }

    #[test]
    fn test_master_volume_range() {
        let mut req = request();
        req.master_volume = 2.0;
        assert!(req.validate().is_ok());

        req.master_volume = 2.1;
        assert!(req.validate().is_err());

        req.master_volume = -0.1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let json = serde_json::json!({
            "jobId": "j1",
            "sceneId": Uuid::new_v4(),
            "projectId": Uuid::new_v4(),
            "callbackUrl": "https://caller.test/hook",
            "shots": [{
                "id": "s1",
                "order": 0,
                "sourceUrl": "https://assets.test/s1.mp4",
                "durationMs": 4000
            }]
        });

        let req: CompositionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.master_volume, 1.0);
        assert!(req.audio_tracks.is_empty());
        assert_eq!(req.shots[0].fade_in, FadeKind::None);
        assert_eq!(req.shots[0].trim_start_ms, 0);
        assert!(!req.shots[0].muted);
    }

    #[test]
    fn test_job_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobState::Downloading).unwrap(), "\"downloading\"");
        assert_eq!(serde_json::to_string(&JobState::Completed).unwrap(), "\"completed\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Uploading.is_terminal());
        assert!(!JobState::Queued.is_terminal());
    }

    #[test]
    fn test_progress_ranges_cover_pipeline() {
        assert_eq!(JobState::Downloading.progress_range(), (0, 20));
        assert_eq!(JobState::Processing.progress_range(), (20, 80));
        assert_eq!(JobState::Uploading.progress_range(), (80, 100));
        assert_eq!(JobState::Completed.progress_range(), (100, 100));
    }

    #[test]
    fn test_transitions_are_ordered() {
        assert!(JobState::Queued.ordinal() < JobState::Downloading.ordinal());
        assert!(JobState::Downloading.ordinal() < JobState::Processing.ordinal());
        assert!(JobState::Processing.ordinal() < JobState::Uploading.ordinal());
        assert!(JobState::Uploading.ordinal() < JobState::Completed.ordinal());
        // Failed is reachable from any non-terminal state
        assert_eq!(JobState::Failed.ordinal(), JobState::Completed.ordinal());
    }
}
