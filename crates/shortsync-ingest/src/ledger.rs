//! Completion ledger
//!
//! Durable set of names that have already been published. The on-disk format
//! is plain UTF-8 text, one name per line, so an operator can inspect or edit
//! it with ordinary tools. Appends are flushed and `fsync`ed before
//! [`CompletionLedger::add`] returns.
//!
//! The ledger assumes a single writer. Two pipeline instances sharing one
//! ledger file is unsupported and can publish the same item twice.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::models::CompletionRecord;

/// Membership test and append over the set of published names
pub trait CompletionLedger: Send + Sync {
    /// Whether `name` was published by this or any earlier run
    fn contains(&self, name: &str) -> bool;

    /// Durably record `name`; recording a name twice is a no-op
    fn add(&mut self, name: &str) -> Result<(), LedgerError>;

    /// Number of recorded names
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Line-oriented text file ledger
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    names: HashSet<String>,
    // Insertion order, for display
    order: Vec<String>,
}

impl FileLedger {
    /// Open the ledger, creating the file and its parent directory if missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;

        let mut names = HashSet::new();
        let mut order = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            let name = line.strip_suffix('\r').unwrap_or(&line);
            if name.is_empty() {
                continue;
            }
            if names.insert(name.to_string()) {
                order.push(name.to_string());
            }
        }

        info!(path = %path.display(), records = order.len(), "Opened completion ledger");

        Ok(Self { path, names, order })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded names in the order they were first written
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = CompletionRecord> + '_ {
        self.order.iter().map(|name| CompletionRecord { name: name.clone() })
    }

    fn append_line(&self, name: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        file.write_all(format!("{}\n", name).as_bytes())?;
        file.flush()?;
        file.sync_data()
    }
}

impl CompletionLedger for FileLedger {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn add(&mut self, name: &str) -> Result<(), LedgerError> {
        validate_name(name)?;

        if self.names.contains(name) {
            debug!(name, "Already recorded, skipping ledger append");
            return Ok(());
        }

        self.append_line(name).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.names.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Whether `name` can be stored as one ledger line
pub fn is_recordable(name: &str) -> bool {
    !name.is_empty() && !name.contains(['\n', '\r'])
}

fn validate_name(name: &str) -> Result<(), LedgerError> {
    if !is_recordable(name) {
        return Err(LedgerError::InvalidName(name.to_string()));
    }
    Ok(())
}
