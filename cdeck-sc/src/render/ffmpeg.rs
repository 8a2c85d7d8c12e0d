//! ffmpeg-backed renderer
//!
//! Drives the external ffmpeg binary as a subprocess, one invocation per
//! pipeline operation. Argument lists are built by pure functions so the
//! exact command lines are unit-testable without a binary present; the
//! only I/O is in [`FfmpegRenderer::run`].
//!
//! Clips are always re-encoded to a uniform format (libx264 + aac,
//! 44.1kHz stereo) so the concat step can stream-copy. Every clip must
//! carry exactly one audio stream for that uniformity to hold, so muted
//! shots and sources with no audio stream both get a synthesized silent
//! track instead of no track at all.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cdeck_common::time::millis_to_secs_arg;
use cdeck_common::timeline::{AudioPlacement, TimelineEntry};
use tokio::process::Command;
use tracing::{debug, info};

use super::MediaRenderer;
use crate::error::{Error, Result};

const SILENT_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Renderer invoking a configured ffmpeg binary
pub struct FfmpegRenderer {
    ffmpeg_bin: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }

    /// Verify the binary is runnable before accepting any work.
    ///
    /// Runs `ffmpeg -version`; startup aborts if the binary is missing or
    /// the exit status is non-zero.
    pub async fn probe(&self) -> Result<String> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-version")
            .output()
            .await
            .map_err(|e| {
                Error::Render {
                    stage: "probe",
                    message: format!(
                        "cannot execute renderer at {}: {e}",
                        self.ffmpeg_bin.display()
                    ),
                }
            })?;

        if !output.status.success() {
            return Err(Error::Render {
                stage: "probe",
                message: format!(
                    "renderer version check exited with {}",
                    output.status.code().unwrap_or(-1)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("unknown").to_string();
        info!(renderer = %first_line, "renderer available");
        Ok(first_line)
    }

    /// Check whether `src` carries at least one audio stream.
    ///
    /// Decodes a single audio frame to null output; a non-zero exit means
    /// the `0:a:0` mapping found nothing to select.
    async fn has_audio_stream(&self, src: &Path) -> Result<bool> {
        let output = Command::new(&self.ffmpeg_bin)
            .args(audio_check_args(src))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Render {
                stage: "cut",
                message: format!("failed to spawn renderer for audio check: {e}"),
            })?;
        Ok(output.status.success())
    }

    /// Run one ffmpeg invocation; a non-zero exit becomes a stage-tagged
    /// render error carrying the tail of stderr.
    async fn run(&self, args: Vec<String>, stage: &'static str) -> Result<()> {
        debug!(stage, cmd = %args.join(" "), "invoking renderer");

        let output = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Render {
                stage,
                message: format!("failed to spawn renderer: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // last few stderr lines carry the actual failure reason
            let tail: Vec<&str> = stderr.lines().rev().take(6).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(Error::Render {
                stage,
                message: format!(
                    "renderer exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail.join(" | ")
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl MediaRenderer for FfmpegRenderer {
    async fn cut_shot(&self, entry: &TimelineEntry, src: &Path, dest: &Path) -> Result<()> {
        // a source without audio gets the same silence substitution as a
        // muted shot; skip the check when the answer cannot matter
        let has_audio = if entry.shot.muted {
            false
        } else {
            self.has_audio_stream(src).await?
        };
        self.run(cut_args(entry, src, dest, has_audio), "cut").await
    }

    async fn concat(&self, clips: &[PathBuf], dest: &Path) -> Result<()> {
        // concat demuxer reads the clip list from a file next to the output
        let list_path = dest.with_extension("txt");
        let mut list = String::new();
        for clip in clips {
            list.push_str(&format!("file '{}'\n", clip.display()));
        }
        tokio::fs::write(&list_path, list).await?;
        self.run(concat_args(&list_path, dest), "concat").await
    }

    async fn prepare_track(&self, placement: &AudioPlacement, src: &Path, dest: &Path) -> Result<()> {
        self.run(track_args(placement, src, dest), "track").await
    }

    async fn mix(
        &self,
        video: &Path,
        stems: &[(PathBuf, u64)],
        master_volume: f64,
        dest: &Path,
    ) -> Result<()> {
        self.run(mix_args(video, stems, master_volume, dest), "mix").await
    }

    async fn extract_frame(&self, video: &Path, at_ms: u64, dest: &Path) -> Result<()> {
        self.run(frame_args(video, at_ms, dest), "thumbnail").await
    }
}

fn push(args: &mut Vec<String>, parts: &[&str]) {
    for part in parts {
        args.push(part.to_string());
    }
}

/// Arguments for asking whether a source carries any audio.
///
/// Mapping `0:a:0` fails outright when the source has no audio stream,
/// so the exit status answers the question without producing output.
pub fn audio_check_args(src: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push(&mut args, &["-i"]);
    args.push(src.display().to_string());
    push(&mut args, &["-map", "0:a:0", "-frames:a", "1", "-f", "null", "-"]);
    args
}

/// Arguments for cutting one shot into a normalized clip.
///
/// Seeks past the start trim, takes the effective duration, burns fades
/// into the video stream, and re-encodes to the uniform clip format.
/// Muted shots and sources without audio get synthesized silence in
/// place of source audio so every clip still carries an audio stream.
pub fn cut_args(entry: &TimelineEntry, src: &Path, dest: &Path, has_audio: bool) -> Vec<String> {
    let shot = &entry.shot;
    let silent = shot.muted || !has_audio;
    let mut args = Vec::new();

    push(&mut args, &["-y", "-ss"]);
    args.push(millis_to_secs_arg(shot.trim_start_ms as u64));
    push(&mut args, &["-i"]);
    args.push(src.display().to_string());

    if silent {
        push(&mut args, &["-f", "lavfi", "-i", SILENT_SOURCE]);
    }

    push(&mut args, &["-t"]);
    args.push(millis_to_secs_arg(entry.effective_ms));

    let mut fades = Vec::new();
    if shot.fade_duration_ms > 0 {
        let fade_secs = millis_to_secs_arg(shot.fade_duration_ms as u64);
        if let Some(color) = shot.fade_in.color() {
            fades.push(format!("fade=t=in:st=0:d={fade_secs}:color={color}"));
        }
        if let Some(color) = shot.fade_out.color() {
            let start = entry.effective_ms - shot.fade_duration_ms as u64;
            fades.push(format!(
                "fade=t=out:st={}:d={fade_secs}:color={color}",
                millis_to_secs_arg(start)
            ));
        }
    }
    if !fades.is_empty() {
        push(&mut args, &["-vf"]);
        args.push(fades.join(","));
    }

    push(&mut args, &["-map", "0:v:0"]);
    if silent {
        // silence generator is infinite; -shortest ends it with the video
        push(&mut args, &["-map", "1:a", "-shortest"]);
    } else {
        push(&mut args, &["-map", "0:a:0"]);
    }

    push(&mut args, &[
        "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p",
        "-c:a", "aac", "-ar", "44100", "-ac", "2",
    ]);
    args.push(dest.display().to_string());
    args
}

/// Arguments for joining normalized clips with the concat demuxer.
///
/// Clips share one encode profile, so concatenation stream-copies.
pub fn concat_args(list_path: &Path, dest: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push(&mut args, &["-y", "-f", "concat", "-safe", "0", "-i"]);
    args.push(list_path.display().to_string());
    push(&mut args, &["-c", "copy"]);
    args.push(dest.display().to_string());
    args
}

/// Arguments for rendering one audio track into a placed stem
pub fn track_args(placement: &AudioPlacement, src: &Path, dest: &Path) -> Vec<String> {
    let track = &placement.track;
    let mut args = Vec::new();

    push(&mut args, &["-y", "-ss"]);
    args.push(millis_to_secs_arg(track.trim_start_ms as u64));
    push(&mut args, &["-i"]);
    args.push(src.display().to_string());
    push(&mut args, &["-t"]);
    args.push(millis_to_secs_arg(placement.effective_ms));
    push(&mut args, &["-af"]);
    args.push(format!("volume={}", track.volume));
    push(&mut args, &["-vn", "-c:a", "aac", "-ar", "44100", "-ac", "2"]);
    args.push(dest.display().to_string());
    args
}

/// Arguments for mixing audio stems over the concatenated video.
///
/// Each stem is delayed to its timeline offset with `adelay`, then all
/// stems plus the video's own audio are combined with `amix`
/// (`normalize=0` so per-track volumes survive) and scaled by the master
/// volume. The video stream passes through untouched.
pub fn mix_args(video: &Path, stems: &[(PathBuf, u64)], master_volume: f64, dest: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push(&mut args, &["-y", "-i"]);
    args.push(video.display().to_string());
    for (stem, _) in stems {
        push(&mut args, &["-i"]);
        args.push(stem.display().to_string());
    }

    let mut filter = String::new();
    for (i, (_, offset_ms)) in stems.iter().enumerate() {
        // adelay takes per-channel delays in milliseconds
        filter.push_str(&format!("[{}:a]adelay={o}|{o}[d{i}];", i + 1, o = offset_ms));
    }
    filter.push_str("[0:a]");
    for i in 0..stems.len() {
        filter.push_str(&format!("[d{i}]"));
    }
    filter.push_str(&format!(
        "amix=inputs={}:duration=first:normalize=0,volume={}[aout]",
        stems.len() + 1,
        master_volume
    ));

    push(&mut args, &["-filter_complex"]);
    args.push(filter);
    push(&mut args, &["-map", "0:v", "-map", "[aout]", "-c:v", "copy", "-c:a", "aac"]);
    args.push(dest.display().to_string());
    args
}

/// Arguments for grabbing the thumbnail frame
pub fn frame_args(video: &Path, at_ms: u64, dest: &Path) -> Vec<String> {
    let mut args = Vec::new();
    push(&mut args, &["-y", "-ss"]);
    args.push(millis_to_secs_arg(at_ms));
    push(&mut args, &["-i"]);
    args.push(video.display().to_string());
    push(&mut args, &["-frames:v", "1", "-q:v", "2"]);
    args.push(dest.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdeck_common::types::{AudioTrack, FadeKind, Shot};

    fn shot() -> Shot {
        Shot {
            id: "s1".to_string(),
            order: 0,
            source_url: "https://assets.test/s1.mp4".to_string(),
            duration_ms: 5000,
            trim_start_ms: 500,
            trim_end_ms: 0,
            muted: false,
            fade_in: FadeKind::None,
            fade_out: FadeKind::None,
            fade_duration_ms: 0,
        }
    }

    fn entry(shot: Shot) -> TimelineEntry {
        let effective = (shot.duration_ms - shot.trim_start_ms - shot.trim_end_ms) as u64;
        TimelineEntry {
            shot,
            effective_ms: effective,
            start_ms: 0,
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_cut_seeks_past_trim_and_takes_effective_duration() {
        let args = cut_args(&entry(shot()), Path::new("/in.mp4"), Path::new("/out.mp4"), true);

        assert!(has_pair(&args, "-ss", "0.500"));
        assert!(has_pair(&args, "-t", "4.500"));
        assert!(has_pair(&args, "-i", "/in.mp4"));
        assert_eq!(args.last().unwrap(), "/out.mp4");
        // uniform encode so concat can stream-copy
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-c:a", "aac"));
    }

    #[test]
    fn test_cut_without_fades_has_no_video_filter() {
        let args = cut_args(&entry(shot()), Path::new("/in.mp4"), Path::new("/out.mp4"), true);
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_cut_fades_are_placed_within_effective_duration() {
        let mut s = shot();
        s.trim_start_ms = 0;
        s.fade_in = FadeKind::Black;
        s.fade_out = FadeKind::White;
        s.fade_duration_ms = 1000;
        let args = cut_args(&entry(s), Path::new("/in.mp4"), Path::new("/out.mp4"), true);

        let vf = args
            .windows(2)
            .find(|w| w[0] == "-vf")
            .map(|w| w[1].clone())
            .unwrap();
        assert!(vf.contains("fade=t=in:st=0:d=1.000:color=black"));
        // fade-out starts at effective - fade: 5000 - 1000 = 4000
        assert!(vf.contains("fade=t=out:st=4.000:d=1.000:color=white"));
    }

    #[test]
    fn test_fade_kind_none_produces_no_filter() {
        let mut s = shot();
        s.fade_duration_ms = 1000;
        // kinds stay None, so the duration alone must not add a filter
        let args = cut_args(&entry(s), Path::new("/in.mp4"), Path::new("/out.mp4"), true);
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_muted_shot_gets_silent_audio_stream() {
        let mut s = shot();
        s.muted = true;
        // muted wins even when the source does carry audio
        let args = cut_args(&entry(s), Path::new("/in.mp4"), Path::new("/out.mp4"), true);

        assert!(has_pair(&args, "-i", SILENT_SOURCE));
        assert!(has_pair(&args, "-map", "1:a"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(!has_pair(&args, "-map", "0:a:0"));
    }

    #[test]
    fn test_audioless_source_gets_silent_audio_stream() {
        // an unmuted shot over a video-only source must still produce a
        // clip with an audio stream, or concat and mix lose uniformity
        let args = cut_args(&entry(shot()), Path::new("/in.mp4"), Path::new("/out.mp4"), false);

        assert!(has_pair(&args, "-i", SILENT_SOURCE));
        assert!(has_pair(&args, "-map", "1:a"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(!has_pair(&args, "-map", "0:a:0"));
    }

    #[test]
    fn test_unmuted_shot_maps_own_audio() {
        let args = cut_args(&entry(shot()), Path::new("/in.mp4"), Path::new("/out.mp4"), true);
        assert!(has_pair(&args, "-map", "0:a:0"));
        assert!(!args.contains(&"-shortest".to_string()));
        assert!(!has_pair(&args, "-i", SILENT_SOURCE));
    }

    #[test]
    fn test_audio_check_selects_first_audio_stream_to_null() {
        let args = audio_check_args(Path::new("/in.mp4"));
        assert!(has_pair(&args, "-i", "/in.mp4"));
        assert!(has_pair(&args, "-map", "0:a:0"));
        assert!(has_pair(&args, "-frames:a", "1"));
        assert!(has_pair(&args, "-f", "null"));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn test_concat_stream_copies() {
        let args = concat_args(Path::new("/job/list.txt"), Path::new("/job/scene.mp4"));
        assert!(has_pair(&args, "-f", "concat"));
        assert!(has_pair(&args, "-i", "/job/list.txt"));
        assert!(has_pair(&args, "-c", "copy"));
        assert_eq!(args.last().unwrap(), "/job/scene.mp4");
    }

    #[test]
    fn test_track_applies_trim_volume_and_clamped_duration() {
        let placement = AudioPlacement {
            track: AudioTrack {
                id: "t1".to_string(),
                source_url: "https://assets.test/t1.mp3".to_string(),
                start_ms: 4000,
                duration_ms: 5000,
                trim_start_ms: 250,
                volume: 0.5,
                muted: false,
            },
            start_ms: 4000,
            effective_ms: 1500,
        };
        let args = track_args(&placement, Path::new("/in.mp3"), Path::new("/stem.m4a"));

        assert!(has_pair(&args, "-ss", "0.250"));
        assert!(has_pair(&args, "-t", "1.500"));
        assert!(has_pair(&args, "-af", "volume=0.5"));
        assert!(args.contains(&"-vn".to_string()));
    }

    #[test]
    fn test_mix_delays_stems_and_applies_master_volume() {
        let stems = vec![
            (PathBuf::from("/a.m4a"), 0u64),
            (PathBuf::from("/b.m4a"), 2500u64),
        ];
        let args = mix_args(Path::new("/scene.mp4"), &stems, 0.8, Path::new("/final.mp4"));

        let filter = args
            .windows(2)
            .find(|w| w[0] == "-filter_complex")
            .map(|w| w[1].clone())
            .unwrap();
        assert!(filter.contains("[1:a]adelay=0|0[d0]"));
        assert!(filter.contains("[2:a]adelay=2500|2500[d1]"));
        // video's own audio plus two stems
        assert!(filter.contains("amix=inputs=3:duration=first:normalize=0"));
        assert!(filter.contains("volume=0.8[aout]"));

        assert!(has_pair(&args, "-map", "0:v"));
        assert!(has_pair(&args, "-map", "[aout]"));
        assert!(has_pair(&args, "-c:v", "copy"));
    }

    #[test]
    fn test_frame_extraction_seeks_to_midpoint() {
        let args = frame_args(Path::new("/final.mp4"), 3250, Path::new("/thumb.jpg"));
        assert!(has_pair(&args, "-ss", "3.250"));
        assert!(has_pair(&args, "-frames:v", "1"));
        assert_eq!(args.last().unwrap(), "/thumb.jpg");
    }
}
