//! Shared fakes for pipeline and scheduler tests
//!
//! Every fake keeps its state behind an `Arc<Mutex<..>>` so a test can hand
//! the fake to the pipeline and still inspect what happened afterwards.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::{stream, StreamExt};
use shortsync_ingest::error::{LedgerError, PublishError, SourceError};
use shortsync_ingest::ledger::CompletionLedger;
use shortsync_ingest::models::{PublishDefaults, PublishRequest, RemoteEntry};
use shortsync_ingest::sink::PublishSink;
use shortsync_ingest::source::{ByteStream, RemoteSource};
use shortsync_ingest::staging::StagingStore;
use shortsync_ingest::{IngestionPipeline, PipelineSettings};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const FOLDER: &str = "/Riddles Shorts";

/// Entry whose content is `content of <name>`, modified at 12:<minute>
pub fn entry(name: &str, minute: u32) -> RemoteEntry {
    RemoteEntry::new(
        name,
        format!("id:{}", name),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
    )
}

pub fn content_of(name: &str) -> Vec<u8> {
    format!("content of {}", name).into_bytes()
}

// ============================================================================
// Remote source
// ============================================================================

#[derive(Default)]
struct SourceState {
    entries: Vec<RemoteEntry>,
    list_error: Option<SourceError>,
    fetched: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn with_entries(entries: Vec<RemoteEntry>) -> Self {
        let source = Self::default();
        source.set_entries(entries);
        source
    }

    pub fn set_entries(&self, entries: Vec<RemoteEntry>) {
        self.state.lock().unwrap().entries = entries;
    }

    /// Make the next listing fail
    pub fn fail_listing(&self, error: SourceError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn list(&self, folder: &str) -> Result<Vec<RemoteEntry>, SourceError> {
        assert_eq!(folder, FOLDER);
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.list_error.take() {
            return Err(error);
        }
        Ok(state.entries.clone())
    }

    async fn fetch(&self, locator: &str) -> Result<ByteStream, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(locator.to_string());
        let name = locator.trim_start_matches("id:");
        let content = content_of(name);
        let (head, tail) = content.split_at(content.len() / 2);
        let chunks: Vec<Result<Bytes, SourceError>> = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

// ============================================================================
// Publishing sink
// ============================================================================

/// What a failing publish should look like
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Auth,
    Quota,
    Generic,
}

impl Failure {
    fn to_error(self) -> PublishError {
        match self {
            Failure::Auth => PublishError::Auth("HTTP 401: invalid credentials".to_string()),
            Failure::Quota => PublishError::Quota("HTTP 403 quotaExceeded".to_string()),
            Failure::Generic => PublishError::Remote("HTTP 500 backendError".to_string()),
        }
    }
}

#[derive(Default)]
struct SinkState {
    published: Vec<PublishRequest>,
    attempts: Vec<String>,
    failures: HashMap<String, Failure>,
    staged_contents: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct FakeSink {
    state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    /// Fail every publish whose title is `title`
    pub fn fail_on(&self, title: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(title.to_string(), failure);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Titles successfully published, in order
    pub fn published_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }

    pub fn published_requests(&self) -> Vec<PublishRequest> {
        self.state.lock().unwrap().published.clone()
    }

    /// Titles the pipeline tried to publish, including failures
    pub fn attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Bytes of every staged file handed to the sink
    pub fn staged_contents(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().staged_contents.clone()
    }
}

#[async_trait]
impl PublishSink for FakeSink {
    async fn publish(&self, file: &Path, request: &PublishRequest) -> Result<String, PublishError> {
        let bytes = std::fs::read(file).map_err(|source| PublishError::Io {
            path: file.to_path_buf(),
            source,
        })?;

        let mut state = self.state.lock().unwrap();
        state.attempts.push(request.title.clone());
        state.staged_contents.push(bytes);

        if let Some(failure) = state.failures.get(&request.title) {
            return Err(failure.to_error());
        }

        state.published.push(request.clone());
        Ok(format!("vid-{}", request.title))
    }
}

// ============================================================================
// Completion ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    names: Vec<String>,
    fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn with_names(names: &[&str]) -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().names = names.iter().map(|n| n.to_string()).collect();
        ledger
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().names.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}

impl CompletionLedger for MemoryLedger {
    fn contains(&self, name: &str) -> bool {
        self.state.lock().unwrap().names.iter().any(|n| n == name)
    }

    fn add(&mut self, name: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(LedgerError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        if !state.names.iter().any(|n| n == name) {
            state.names.push(name.to_string());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .names
            .iter()
            .collect::<HashSet<_>>()
            .len()
    }
}

// ============================================================================
// Pipeline harness
// ============================================================================

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        folder: FOLDER.to_string(),
        ordering: Default::default(),
        defaults: PublishDefaults::default(),
    }
}

pub fn staging(dir: &TempDir) -> StagingStore {
    StagingStore::open(dir.path().join("downloads")).unwrap()
}

/// Pipeline over fakes, with handles to inspect them
pub struct Harness<L: CompletionLedger = MemoryLedger> {
    pub pipeline: IngestionPipeline<FakeSource, FakeSink, L>,
    pub source: FakeSource,
    pub sink: FakeSink,
    pub staging: StagingStore,
    pub dir: TempDir,
}

impl Harness<MemoryLedger> {
    pub fn new(entries: Vec<RemoteEntry>, ledger: MemoryLedger) -> Self {
        Self::with_settings(entries, ledger, settings())
    }

    pub fn with_settings(
        entries: Vec<RemoteEntry>,
        ledger: MemoryLedger,
        settings: PipelineSettings,
    ) -> Self {
        Harness::build(entries, ledger, settings)
    }
}

impl<L: CompletionLedger> Harness<L> {
    pub fn build(entries: Vec<RemoteEntry>, ledger: L, settings: PipelineSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::with_entries(entries);
        let sink = FakeSink::default();
        let staging = staging(&dir);
        let pipeline = IngestionPipeline::new(
            source.clone(),
            sink.clone(),
            ledger,
            staging.clone(),
            settings,
        );
        Self {
            pipeline,
            source,
            sink,
            staging,
            dir,
        }
    }

    pub fn resident_files(&self) -> usize {
        self.staging.resident_files().unwrap()
    }
}
