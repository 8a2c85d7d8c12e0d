//! # Clipdeck Common Library
//!
//! Shared code for the Clipdeck scene composition services including:
//! - Composition data model (requests, shots, audio tracks, job status)
//! - Timeline normalization (canonical video timeline + audio plan)
//! - Timestamp utilities

pub mod error;
pub mod time;
pub mod timeline;
pub mod types;

pub use error::{Error, Result};
pub use timeline::{normalize, AudioPlan, TimelineError, VideoTimeline};
