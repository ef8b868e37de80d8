//! shortsync Common Library
//!
//! Shared utilities and error handling for the shortsync workspace.
//!
//! # Overview
//!
//! - **Logging**: centralized `tracing` subscriber setup
//! - **Checksums**: Dropbox-compatible content hashing for staged files
//! - **Error Handling**: error type for the shared utilities
//!
//! # Example
//!
//! ```no_run
//! use shortsync_common::checksum::{verify, ContentHasher};
//!
//! fn main() -> shortsync_common::Result<()> {
//!     let mut hasher = ContentHasher::new();
//!     hasher.update(b"first chunk");
//!     hasher.update(b"second chunk");
//!     verify("E3B0C442...", &hasher.finalize())?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
