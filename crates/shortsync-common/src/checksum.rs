//! Content hashing for staged files
//!
//! Dropbox reports a `content_hash` for every file: the file is split into
//! 4 MiB blocks, each block is hashed with SHA-256, and the concatenated block
//! digests are hashed once more. [`ContentHasher`] computes the same value
//! incrementally so a download can be verified while it streams to disk.

use crate::error::{CommonError, Result};
use sha2::{Digest, Sha256};

/// Block size used by the Dropbox content hash.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Incremental Dropbox content hasher
#[derive(Default)]
pub struct ContentHasher {
    overall: Sha256,
    block: Sha256,
    block_len: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes into the hash
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == BLOCK_SIZE {
                self.finish_block();
            }
        }
    }

    /// Consume the hasher and return the hex-encoded content hash
    pub fn finalize(mut self) -> String {
        if self.block_len > 0 {
            self.finish_block();
        }
        hex::encode(self.overall.finalize())
    }

    fn finish_block(&mut self) {
        let digest = std::mem::take(&mut self.block).finalize();
        self.overall.update(digest);
        self.block_len = 0;
    }
}

/// Compare a computed hash against the expected one (case-insensitive)
pub fn verify(expected: &str, actual: &str) -> Result<()> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
