//! Service configuration
//!
//! Configuration values resolve in priority order: command-line argument,
//! then environment variable (both handled by clap in main), then TOML
//! config file, then compiled defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Scene composer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Bearer shared secret for POST /compose; empty disables auth
    pub shared_secret: String,

    /// Number of concurrent composition workers (caps simultaneous
    /// ffmpeg invocations and scratch-disk usage)
    pub workers: usize,

    /// Maximum queued-but-not-started jobs; a full queue rejects intake
    pub queue_capacity: usize,

    /// Registry entries older than this (by last update) are swept
    pub retention_secs: u64,

    /// Interval between registry sweeps
    pub sweep_interval_secs: u64,

    /// Root directory for per-job scratch directories
    pub scratch_root: PathBuf,

    /// ffmpeg binary path
    pub ffmpeg_bin: PathBuf,

    /// Object storage write endpoint base URL
    pub storage_base_url: String,

    /// Public base URL under which uploaded keys are reachable
    pub storage_public_url: String,

    /// Webhook delivery attempts before giving up
    pub notify_attempts: u32,

    /// Base backoff between webhook attempts, in milliseconds
    pub notify_backoff_ms: u64,

    /// Per-attempt webhook request timeout, in seconds
    pub notify_timeout_secs: u64,

    /// Per-asset download timeout, in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5460,
            shared_secret: String::new(),
            workers: 2,
            queue_capacity: 64,
            retention_secs: 3600,
            sweep_interval_secs: 60,
            scratch_root: std::env::temp_dir().join("cdeck-sc"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            storage_base_url: "http://localhost:9000/cdeck".to_string(),
            storage_public_url: "http://localhost:9000/cdeck".to_string(),
            notify_attempts: 3,
            notify_backoff_ms: 1000,
            notify_timeout_secs: 10,
            fetch_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// no path is given. Missing keys take their default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
            }
            None => Ok(Self::default()),
        }
    }
}
