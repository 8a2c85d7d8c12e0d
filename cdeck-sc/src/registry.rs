//! Job registry
//!
//! Thread-safe map from job id to lifecycle state. Entries are owned by
//! the registry, mutated only by the worker processing the job, and read
//! by status-query callers. A periodic sweep evicts entries whose last
//! update is older than the retention window, terminal or not, to bound
//! memory even for stuck jobs.

use std::collections::HashMap;
use std::sync::Arc;

use cdeck_common::types::{JobState, JobStatus};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Registry holding every known job's status
///
/// Uses RwLock for concurrent status reads with per-transition writes.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new job in `queued` state.
    ///
    /// Rejects duplicate ids while the id is still present, so two racing
    /// requests for the same id cannot both be accepted: the check and
    /// insert happen under one write lock.
    pub async fn insert(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(Error::Validation(format!("duplicate jobId: {job_id}")));
        }
        jobs.insert(job_id.to_string(), JobStatus::new(job_id.to_string()));
        Ok(())
    }

    /// Remove an entry outright (intake rollback when the queue is full)
    pub async fn remove(&self, job_id: &str) {
        self.jobs.write().await.remove(job_id);
    }

    pub async fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Advance a job to the next lifecycle state.
    ///
    /// Transitions are strictly forward; a transition to an earlier or
    /// equal state, or out of a terminal state, is ignored with a warning
    /// rather than corrupting the entry. Progress jumps to at least the
    /// new state's floor and never decreases.
    pub async fn transition(&self, job_id: &str, state: JobState, stage: &str) {
        let mut jobs = self.jobs.write().await;
        let Some(status) = jobs.get_mut(job_id) else {
            warn!(job_id = %job_id, "transition for unknown job");
            return;
        };
        if status.state.is_terminal() || state.ordinal() <= status.state.ordinal() {
            warn!(
                job_id = %job_id,
                from = %status.state.as_str(),
                to = %state.as_str(),
                "ignoring non-forward transition"
            );
            return;
        }
        let (floor, _) = state.progress_range();
        status.state = state;
        status.stage = stage.to_string();
        status.progress = status.progress.max(floor);
        status.updated_at = cdeck_common::time::now();
        info!(job_id = %job_id, state = %state.as_str(), progress = status.progress, "job transition");
    }

    /// Report progress within the current state.
    ///
    /// The value is clamped to the state's stage window and never moves
    /// backwards, so polling callers observe only forward progress.
    pub async fn set_progress(&self, job_id: &str, progress: u8) {
        let mut jobs = self.jobs.write().await;
        let Some(status) = jobs.get_mut(job_id) else {
            return;
        };
        if status.state.is_terminal() {
            return;
        }
        let (floor, ceiling) = status.state.progress_range();
        let clamped = progress.clamp(floor, ceiling);
        if clamped > status.progress {
            status.progress = clamped;
            status.updated_at = cdeck_common::time::now();
        }
    }

    /// Mark a job completed; progress becomes 100
    pub async fn complete(&self, job_id: &str) {
        let mut jobs = self.jobs.write().await;
        let Some(status) = jobs.get_mut(job_id) else {
            return;
        };
        if status.state.is_terminal() {
            return;
        }
        status.state = JobState::Completed;
        status.stage = "completed".to_string();
        status.progress = 100;
        status.updated_at = cdeck_common::time::now();
        info!(job_id = %job_id, "job completed");
    }

    /// Mark a job failed with a human-readable message.
    ///
    /// Reachable from any non-terminal state; the progress value is left
    /// where the job stopped.
    pub async fn fail(&self, job_id: &str, message: String) {
        let mut jobs = self.jobs.write().await;
        let Some(status) = jobs.get_mut(job_id) else {
            return;
        };
        if status.state.is_terminal() {
            return;
        }
        status.state = JobState::Failed;
        status.stage = "failed".to_string();
        status.error = Some(message);
        status.updated_at = cdeck_common::time::now();
        warn!(job_id = %job_id, error = %status.error.as_deref().unwrap_or(""), "job failed");
    }

    /// Evict entries not updated within the retention window.
    ///
    /// Applies to terminal and non-terminal entries alike; returns the
    /// number of evicted jobs.
    pub async fn sweep(&self, retention: chrono::Duration) -> usize {
        let cutoff = cdeck_common::time::now() - retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, status| status.updated_at >= cutoff);
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!(evicted, remaining = jobs.len(), "registry sweep evicted stale jobs");
        }
        evicted
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background sweep task.
///
/// The task holds its own registry handle and runs on a fixed interval,
/// independent of request traffic.
pub fn spawn_sweeper(
    registry: Arc<JobRegistry>,
    interval: std::time::Duration,
    retention: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick fires immediately; skip it so a fresh start does not
        // sweep before anything could age out
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = registry.sweep(retention).await;
            debug!(evicted, "registry sweep pass");
        }
    })
}
