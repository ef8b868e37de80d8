//! Remote listing sources
//!
//! A [`RemoteSource`] lists the files in a folder and streams the content of
//! one of them back on request. The pipeline only ever talks to this trait.

pub mod dropbox;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::SourceError;
use crate::models::RemoteEntry;

pub use dropbox::{DropboxClient, DropboxConfig};

/// Streamed file content
pub type ByteStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// Lists a remote folder and fetches entries from it
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List the files currently in `folder`
    async fn list(&self, folder: &str) -> Result<Vec<RemoteEntry>, SourceError>;

    /// Open a byte stream for the entry identified by `locator`
    async fn fetch(&self, locator: &str) -> Result<ByteStream, SourceError>;
}
