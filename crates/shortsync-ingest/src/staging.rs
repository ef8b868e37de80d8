//! Local staging of remote files
//!
//! Every entry is streamed to a unique path inside the staging directory,
//! written under a `.part` name and renamed once complete. The resulting
//! [`StagedFile`] removes its file when discarded or dropped, so no exit path
//! leaves data behind. [`StagingStore::purge`] clears leftovers from a crashed
//! run at startup. Only files named the way the store names them are ever
//! touched; anything else sharing the directory is left alone.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use shortsync_common::checksum::{self, ContentHasher};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IngestError, TransferError};
use crate::models::RemoteEntry;
use crate::source::RemoteSource;

const PART_SUFFIX: &str = ".part";

/// Length of a hyphenated UUID prefix
const UUID_LEN: usize = 36;

/// Longest sanitized name kept in a staged file name, in characters.
const MAX_STAGED_NAME_CHARS: usize = 120;

/// Scratch directory holding at most one in-flight file
#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
    verify_content_hash: bool,
    show_progress: bool,
}

impl StagingStore {
    /// Open the staging directory, creating it if missing
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| IngestError::Staging {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            verify_content_hash: true,
            show_progress: false,
        })
    }

    pub fn with_content_hash(mut self, verify: bool) -> Self {
        self.verify_content_hash = verify;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove staged files left over from an earlier run; returns how many were removed
    pub fn purge(&self) -> Result<usize, IngestError> {
        let staging_err = |source| IngestError::Staging {
            path: self.dir.clone(),
            source,
        };

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir).map_err(staging_err)? {
            let entry = entry.map_err(staging_err)?;
            if !entry.file_type().map_err(staging_err)?.is_file() {
                continue;
            }
            if !is_staged_name(&entry.file_name().to_string_lossy()) {
                debug!(path = %entry.path().display(), "Not a staged file, keeping");
                continue;
            }
            std::fs::remove_file(entry.path()).map_err(staging_err)?;
            removed += 1;
        }

        if removed > 0 {
            warn!(dir = %self.dir.display(), removed, "Purged leftover staged files");
        }
        Ok(removed)
    }

    /// Number of staged files currently in the staging directory
    pub fn resident_files(&self) -> io::Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_staged_name(&entry.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Stream `entry` from `source` into the store
    ///
    /// On any failure the partial file is removed before returning.
    pub async fn stage<S>(&self, source: &S, entry: &RemoteEntry) -> Result<StagedFile, TransferError>
    where
        S: RemoteSource + ?Sized,
    {
        let final_path = self
            .dir
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&entry.name)));
        let mut part_path = final_path.clone().into_os_string();
        part_path.push(PART_SUFFIX);

        // Removes the partial file on every early return below
        let mut staged = StagedFile::new(PathBuf::from(part_path));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TransferError::Io { path, source }
        };

        let mut stream = source.fetch(&entry.locator).await?;
        let mut file = tokio::fs::File::create(&staged.path)
            .await
            .map_err(io_err(&staged.path))?;

        let mut hasher = entry
            .content_hash
            .as_ref()
            .filter(|_| self.verify_content_hash)
            .map(|_| ContentHasher::new());
        let progress = self.show_progress.then(|| progress_bar(entry));

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_err(&staged.path))?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            staged.size += chunk.len() as u64;
            if let Some(pb) = &progress {
                pb.set_position(staged.size);
            }
        }

        file.flush().await.map_err(io_err(&staged.path))?;
        file.sync_all().await.map_err(io_err(&staged.path))?;
        drop(file);

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        if let Some(expected) = entry.size {
            if expected != staged.size {
                return Err(TransferError::Truncated {
                    expected,
                    received: staged.size,
                });
            }
        }

        if let (Some(hasher), Some(expected)) = (hasher, entry.content_hash.as_deref()) {
            let actual = hasher.finalize();
            checksum::verify(expected, &actual).map_err(|_| TransferError::ContentHash {
                expected: expected.to_string(),
                actual,
            })?;
            debug!(name = %entry.name, "Content hash verified");
        }

        tokio::fs::rename(&staged.path, &final_path)
            .await
            .map_err(io_err(&final_path))?;
        staged.path = final_path;

        info!(name = %entry.name, bytes = staged.size, path = %staged.path.display(), "Staged");
        Ok(staged)
    }
}

/// A fully transferred file in the staging store
///
/// The file is deleted by [`StagedFile::discard`] or, failing that, on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    size: u64,
    removed: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            size: 0,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the file now, reporting any error
    pub fn discard(mut self) -> io::Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_if_present(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Whether `file_name` follows the `<uuid>-<name>` or `.part` staging scheme
fn is_staged_name(file_name: &str) -> bool {
    if file_name.ends_with(PART_SUFFIX) {
        return true;
    }
    match file_name.split_at_checked(UUID_LEN) {
        Some((prefix, rest)) => rest.starts_with('-') && Uuid::try_parse(prefix).is_ok(),
        None => false,
    }
}

/// Make a remote name safe to use as a local file name component
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STAGED_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "item".to_string()
    } else {
        cleaned.to_string()
    }
}

fn progress_bar(entry: &RemoteEntry) -> ProgressBar {
    let pb = match entry.size {
        Some(size) => ProgressBar::new(size),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Downloading {}", entry.name));
    pb
}
