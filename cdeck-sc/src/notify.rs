//! Webhook notification
//!
//! Delivers the terminal CompositionResult to the caller's callback URL.
//! Delivery is best-effort with a bounded retry budget; exhausting the
//! budget is logged but never changes the job's outcome, which is already
//! recorded in the registry by the time delivery starts.

use cdeck_common::types::CompositionResult;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Webhook client with bounded retry
pub struct Notifier {
    client: Client,
    attempts: u32,
    backoff: std::time::Duration,
}

impl Notifier {
    pub fn new(attempts: u32, backoff: std::time::Duration, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notify(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            attempts: attempts.max(1),
            backoff,
        })
    }

    /// POST the result as JSON, retrying on any failure.
    ///
    /// An attempt counts as delivered only on a 2xx response. Between
    /// attempts the notifier sleeps for the fixed backoff; after the last
    /// attempt the error is returned for the caller to log.
    pub async fn deliver(&self, callback_url: &str, result: &CompositionResult) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.client.post(callback_url).json(result).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        job_id = %result.job_id,
                        attempt,
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            warn!(
                job_id = %result.job_id,
                attempt,
                attempts = self.attempts,
                error = %last_error,
                "webhook delivery attempt failed"
            );

            if attempt < self.attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(Error::Notify(format!(
            "webhook to {callback_url} failed after {} attempts: {last_error}",
            self.attempts
        )))
    }
}
