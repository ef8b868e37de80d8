//! Publishing sinks
//!
//! A [`PublishSink`] takes a staged local file plus its metadata and returns
//! the identifier the platform assigned to it.

pub mod youtube;

use async_trait::async_trait;
use std::path::Path;

use crate::error::PublishError;
use crate::models::PublishRequest;

pub use youtube::{YouTubeClient, YouTubeConfig};

/// Accepts a local file and publishes it
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Publish `file` with `request` metadata, returning the published id
    async fn publish(&self, file: &Path, request: &PublishRequest) -> Result<String, PublishError>;
}
