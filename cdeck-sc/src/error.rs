//! Error types for cdeck-sc
//!
//! Defines the service error taxonomy using thiserror. Fatal pipeline
//! errors (Fetch, Render, Publish) are caught at the worker boundary and
//! recorded on the job; Validation and Auth surface synchronously at
//! intake; Notify is never fatal to an already-terminal job.

use thiserror::Error;

/// Main error type for the scene composer service
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request or invalid timeline; surfaced as 400 at intake
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid shared secret; surfaced as 401 at intake
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Asset download failure; fatal to the job
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// External rendering failure; fatal to the job
    #[error("Render error in {stage}: {message}")]
    Render { stage: &'static str, message: String },

    /// Artifact upload failure; fatal to the job
    #[error("Publish error: {0}")]
    Publish(String),

    /// Webhook delivery failure; non-fatal, retried then dropped
    #[error("Notify error: {0}")]
    Notify(String),

    /// Intake queue full or closed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cdeck_common::Error> for Error {
    fn from(e: cdeck_common::Error) -> Self {
        Error::Validation(e.to_string())
    }
}

impl From<cdeck_common::TimelineError> for Error {
    fn from(e: cdeck_common::TimelineError) -> Self {
        Error::Validation(e.to_string())
    }
}

/// Convenience Result type using the cdeck-sc Error
pub type Result<T> = std::result::Result<T, Error>;
