//! Timeline normalization
//!
//! Converts raw shot/track declarations into a canonical, validated,
//! absolute-time timeline. Shots become a strictly sequential, ordered
//! video timeline; audio tracks become a placement plan clamped to the
//! total video duration.
//!
//! All math is in integer milliseconds. This module has no I/O; it is the
//! single authority on timeline validity.

use thiserror::Error;
use tracing::warn;

use crate::types::{AudioTrack, FadeKind, Shot};

/// Timeline validation failure; no job is created when this is raised at
/// intake, and the pipeline aborts before any download when raised later.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("shot {id}: trims ({trim_start_ms}+{trim_end_ms} ms) leave no duration of nominal {duration_ms} ms")]
    NonPositiveDuration {
        id: String,
        duration_ms: i64,
        trim_start_ms: i64,
        trim_end_ms: i64,
    },

    #[error("duplicate shot order {order}")]
    DuplicateOrder { order: i64 },

    #[error("{entity} {id}: negative {field} ({value})")]
    NegativeField {
        entity: &'static str,
        id: String,
        field: &'static str,
        value: i64,
    },

    #[error("shot {id}: fade duration {fade_ms} ms exceeds half of post-trim duration {effective_ms} ms")]
    FadeTooLong {
        id: String,
        fade_ms: i64,
        effective_ms: i64,
    },

    #[error("track {id}: negative volume {volume}")]
    NegativeVolume { id: String, volume: f64 },
}

/// One shot placed on the absolute timeline
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub shot: Shot,
    /// Post-trim duration contributed to the timeline
    pub effective_ms: u64,
    /// Absolute start: sum of effective durations of all earlier shots
    pub start_ms: u64,
}

/// Canonical ordered video timeline
#[derive(Debug, Clone)]
pub struct VideoTimeline {
    pub entries: Vec<TimelineEntry>,
    /// Sum of all effective shot durations
    pub total_ms: u64,
}

/// One audio track with its clamped placement window
#[derive(Debug, Clone)]
pub struct AudioPlacement {
    pub track: AudioTrack,
    pub start_ms: u64,
    /// Duration after clamping to the video timeline
    pub effective_ms: u64,
}

/// Canonical audio placement plan
#[derive(Debug, Clone, Default)]
pub struct AudioPlan {
    pub placements: Vec<AudioPlacement>,
    /// Ids of tracks dropped because their placement starts past the end
    /// of the video; recorded as warnings, never fatal.
    pub dropped: Vec<String>,
}

/// Normalize shots and tracks into a canonical timeline.
///
/// Shots are sorted by `order` ascending with ties broken by original
/// array position (stable sort); each shot contributes
/// `duration - trim_start - trim_end` milliseconds.
pub fn normalize(shots: &[Shot], tracks: &[AudioTrack]) -> Result<(VideoTimeline, AudioPlan), TimelineError> {
    let mut ordered: Vec<Shot> = shots.to_vec();
    // sort_by_key is stable: equal orders keep their input positions.
    // Duplicate orders are rejected below, so stability only matters for
    // producing a deterministic error.
    ordered.sort_by_key(|s| s.order);

    for pair in ordered.windows(2) {
        if pair[0].order == pair[1].order {
            return Err(TimelineError::DuplicateOrder { order: pair[0].order });
        }
    }

    let mut entries = Vec::with_capacity(ordered.len());
    let mut cursor: u64 = 0;

    for shot in ordered {
        check_shot_fields(&shot)?;

        let effective = shot.duration_ms - shot.trim_start_ms - shot.trim_end_ms;
        if effective <= 0 {
            return Err(TimelineError::NonPositiveDuration {
                id: shot.id.clone(),
                duration_ms: shot.duration_ms,
                trim_start_ms: shot.trim_start_ms,
                trim_end_ms: shot.trim_end_ms,
            });
        }

        // The fade is an overlay within the shot; both fades must fit in
        // their own half of the post-trim duration.
        let fades = shot.fade_in != FadeKind::None || shot.fade_out != FadeKind::None;
        if fades && shot.fade_duration_ms * 2 > effective {
            return Err(TimelineError::FadeTooLong {
                id: shot.id.clone(),
                fade_ms: shot.fade_duration_ms,
                effective_ms: effective,
            });
        }

        let effective = effective as u64;
        entries.push(TimelineEntry {
            shot,
            effective_ms: effective,
            start_ms: cursor,
        });
        cursor += effective;
    }

    let timeline = VideoTimeline {
        entries,
        total_ms: cursor,
    };

    let mut plan = AudioPlan::default();
    for track in tracks {
        check_track_fields(track)?;

        let start = track.start_ms as u64;
        if start >= timeline.total_ms {
            warn!(
                track_id = %track.id,
                start_ms = start,
                total_ms = timeline.total_ms,
                "audio track starts past end of video, dropping"
            );
            plan.dropped.push(track.id.clone());
            continue;
        }

        // Truncate to fit the video: placement window is [start, total].
        let effective = (track.duration_ms as u64).min(timeline.total_ms - start);
        plan.placements.push(AudioPlacement {
            track: track.clone(),
            start_ms: start,
            effective_ms: effective,
        });
    }

    Ok((timeline, plan))
}

fn check_shot_fields(shot: &Shot) -> Result<(), TimelineError> {
    let fields = [
        ("durationMs", shot.duration_ms),
        ("trimStartMs", shot.trim_start_ms),
        ("trimEndMs", shot.trim_end_ms),
        ("fadeDurationMs", shot.fade_duration_ms),
        ("order", shot.order),
    ];
    for (field, value) in fields {
        if value < 0 {
            return Err(TimelineError::NegativeField {
                entity: "shot",
                id: shot.id.clone(),
                field,
                value,
            });
        }
    }
    Ok(())
}

fn check_track_fields(track: &AudioTrack) -> Result<(), TimelineError> {
    let fields = [
        ("startMs", track.start_ms),
        ("durationMs", track.duration_ms),
        ("trimStartMs", track.trim_start_ms),
    ];
    for (field, value) in fields {
        if value < 0 {
            return Err(TimelineError::NegativeField {
                entity: "track",
                id: track.id.clone(),
                field,
                value,
            });
        }
    }
    if track.volume < 0.0 {
        return Err(TimelineError::NegativeVolume {
            id: track.id.clone(),
            volume: track.volume,
        });
    }
    Ok(())
}
