//! HTTP API
//!
//! Intake and status endpoints plus the authentication layer.

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{create_router, AppContext};
