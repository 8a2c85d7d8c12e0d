//! # Clipdeck Scene Composer (cdeck-sc)
//!
//! Microservice that renders declarative scene timelines into finished
//! video artifacts. Accepts a CompositionRequest over HTTP, validates and
//! normalizes the timeline, drives an external ffmpeg binary through cut,
//! concat, and mix stages, publishes the video and thumbnail to object
//! storage, and reports the terminal result to the caller's webhook.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod render;

pub use config::Config;
pub use error::{Error, Result};
