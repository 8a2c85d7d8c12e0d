//! Common error types for Clipdeck

use thiserror::Error;

/// Common result type for Clipdeck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across Clipdeck services
#[derive(Error, Debug)]
pub enum Error {
    /// Structurally invalid composition request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeline could not be normalized
    #[error(transparent)]
    Timeline(#[from] crate::timeline::TimelineError),
}
