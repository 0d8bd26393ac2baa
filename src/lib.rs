//! Transcode Service
//!
//! Orchestrates distributed HLS packaging: ingests uploaded videos, fans the
//! work out to remote converter workers, polls them to completion, collects
//! the produced playlists and segments, and serves the finished package.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
