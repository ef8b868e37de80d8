//! Ingestion pipeline
//!
//! One sweep lists the remote folder, drops names already in the completion
//! ledger, orders what is left and then walks the candidates strictly in
//! order: stage, publish, record, clean up. The first failure ends the sweep,
//! so a later item is never published while an earlier one is still pending.

use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{SweepError, SweepFailure};
use crate::ledger::{self, CompletionLedger};
use crate::models::{
    OrderingPolicy, PublishDefaults, PublishRequest, PublishedItem, RemoteEntry, SweepOutcome,
    SweepReport,
};
use crate::sink::PublishSink;
use crate::source::RemoteSource;
use crate::staging::{StagedFile, StagingStore};

/// What to sweep and how to publish it
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub folder: String,
    pub ordering: OrderingPolicy,
    pub defaults: PublishDefaults,
}

/// Candidates chosen from one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// New entries, in publish order
    pub candidates: Vec<RemoteEntry>,
    pub skipped: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Deduplicate, filter against the ledger and order a listing
///
/// Duplicate names keep their first occurrence in listing order. Names the
/// ledger cannot store are dropped, since they could never be recorded.
pub fn select_candidates<L>(listing: Vec<RemoteEntry>, ledger: &L, ordering: OrderingPolicy) -> Selection
where
    L: CompletionLedger + ?Sized,
{
    let mut selection = Selection::default();
    let mut seen = HashSet::with_capacity(listing.len());

    for entry in listing {
        if !seen.insert(entry.name.clone()) {
            warn!(name = %entry.name, "Duplicate name in listing, keeping first occurrence");
            selection.duplicates += 1;
            continue;
        }
        if ledger.contains(&entry.name) {
            debug!(name = %entry.name, "Already published, skipping");
            selection.skipped += 1;
            continue;
        }
        if !ledger::is_recordable(&entry.name) {
            warn!(name = ?entry.name, "Name cannot be recorded in the ledger, ignoring");
            selection.rejected += 1;
            continue;
        }
        selection.candidates.push(entry);
    }

    match ordering {
        OrderingPolicy::ByName => selection.candidates.sort_by(|a, b| a.name.cmp(&b.name)),
        OrderingPolicy::ByModifiedTime => selection.candidates.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        }),
    }

    selection
}

/// Moves new remote files to the publishing sink, once each, in order
pub struct IngestionPipeline<S, P, L> {
    source: S,
    sink: P,
    ledger: L,
    staging: StagingStore,
    settings: PipelineSettings,
}

impl<S, P, L> IngestionPipeline<S, P, L>
where
    S: RemoteSource,
    P: PublishSink,
    L: CompletionLedger,
{
    pub fn new(
        source: S,
        sink: P,
        ledger: L,
        staging: StagingStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            sink,
            ledger,
            staging,
            settings,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Perform exactly one sweep
    ///
    /// A failure carries the report of everything published before it.
    #[instrument(skip(self), fields(folder = %self.settings.folder, ordering = %self.settings.ordering))]
    pub async fn run_once(&mut self) -> Result<SweepOutcome, SweepFailure> {
        let mut report = SweepReport::default();

        let listing = match self.source.list(&self.settings.folder).await {
            Ok(listing) => listing,
            Err(source) => {
                let error = SweepError::Listing {
                    folder: self.settings.folder.clone(),
                    source,
                };
                error!(step = %error.step(), error = %error, "Sweep failed");
                return Err(SweepFailure { report, error });
            },
        };
        report.listed = listing.len();

        let selection = select_candidates(listing, &self.ledger, self.settings.ordering);
        report.skipped = selection.skipped;
        report.duplicates = selection.duplicates;
        report.rejected = selection.rejected;
        report.candidates = selection.candidates.len();

        if selection.candidates.is_empty() {
            info!(listed = report.listed, skipped = report.skipped, "No new files");
            return Ok(SweepOutcome::NoWork(report));
        }

        info!(
            listed = report.listed,
            skipped = report.skipped,
            candidates = report.candidates,
            "Found new files"
        );

        for entry in &selection.candidates {
            match self.process(entry).await {
                Ok(item) => report.published.push(item),
                Err(error) => {
                    error!(
                        name = %entry.name,
                        step = %error.step(),
                        published = report.published.len(),
                        error = %error,
                        "Sweep aborted"
                    );
                    return Err(SweepFailure { report, error });
                },
            }
        }

        info!(
            published = report.published.len(),
            last = ?report.last_published(),
            "Sweep completed"
        );
        Ok(SweepOutcome::Completed(report))
    }

    /// Stage, publish, record and clean up a single entry
    async fn process(&mut self, entry: &RemoteEntry) -> Result<PublishedItem, SweepError> {
        let staged = self
            .staging
            .stage(&self.source, entry)
            .await
            .map_err(|source| SweepError::Transfer {
                name: entry.name.clone(),
                source,
            })?;

        let result = self.publish_and_record(entry, &staged).await;

        let path = staged.path().to_path_buf();
        if let Err(e) = staged.discard() {
            warn!(name = %entry.name, path = %path.display(), error = %e, "Failed to remove staged file");
        }

        result
    }

    async fn publish_and_record(
        &mut self,
        entry: &RemoteEntry,
        staged: &StagedFile,
    ) -> Result<PublishedItem, SweepError> {
        let request = PublishRequest::for_entry(entry, &self.settings.defaults);

        let published_id = self
            .sink
            .publish(staged.path(), &request)
            .await
            .map_err(|source| SweepError::Publish {
                name: entry.name.clone(),
                source,
            })?;

        info!(name = %entry.name, published_id = %published_id, "Published");

        if let Err(source) = self.ledger.add(&entry.name) {
            error!(
                name = %entry.name,
                published_id = %published_id,
                error = %source,
                "Published but not recorded; this item may be published again after a restart"
            );
            return Err(SweepError::LedgerWrite {
                name: entry.name.clone(),
                published_id,
                source,
            });
        }

        Ok(PublishedItem {
            name: entry.name.clone(),
            published_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct MemoryLedger(HashSet<String>);

    impl CompletionLedger for MemoryLedger {
        fn contains(&self, name: &str) -> bool {
            self.0.contains(name)
        }

        fn add(&mut self, name: &str) -> Result<(), LedgerError> {
            self.0.insert(name.to_string());
            Ok(())
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn entry(name: &str, minute: u32) -> RemoteEntry {
        RemoteEntry::new(
            name,
            format!("id:{}", name),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        )
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection.candidates.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_orders_by_name() {
        let listing = vec![entry("b.mp4", 0), entry("a.mp4", 1), entry("c.mp4", 2)];
        let selection = select_candidates(listing, &MemoryLedger::default(), OrderingPolicy::ByName);
        assert_eq!(names(&selection), vec!["a.mp4", "b.mp4", "c.mp4"]);
    }

    #[test]
    fn test_name_order_is_bytewise() {
        let listing = vec![entry("b.mp4", 0), entry("B.mp4", 0), entry("a.mp4", 0)];
        let selection = select_candidates(listing, &MemoryLedger::default(), OrderingPolicy::ByName);
        assert_eq!(names(&selection), vec!["B.mp4", "a.mp4", "b.mp4"]);
    }

    #[test]
    fn test_orders_by_modified_time_with_name_tiebreak() {
        let listing = vec![
            entry("late.mp4", 30),
            entry("z-early.mp4", 5),
            entry("a-early.mp4", 5),
        ];
        let selection =
            select_candidates(listing, &MemoryLedger::default(), OrderingPolicy::ByModifiedTime);
        assert_eq!(names(&selection), vec!["a-early.mp4", "z-early.mp4", "late.mp4"]);
    }

    #[test]
    fn test_filters_ledger_and_keeps_first_duplicate() {
        let mut ledger = MemoryLedger::default();
        ledger.add("a.mp4").unwrap();

        let mut second = entry("b.mp4", 9);
        second.locator = "id:second".to_string();
        let listing = vec![entry("a.mp4", 0), entry("b.mp4", 1), second, entry("a.mp4", 2)];

        let selection = select_candidates(listing, &ledger, OrderingPolicy::ByName);
        assert_eq!(names(&selection), vec!["b.mp4"]);
        assert_eq!(selection.candidates[0].locator, "id:b.mp4");
        assert_eq!(selection.skipped, 1);
        assert_eq!(selection.duplicates, 2);
    }

    #[test]
    fn test_unrecordable_names_are_rejected() {
        let listing = vec![entry("bad\nname.mp4", 0), entry("ok.mp4", 1)];
        let selection = select_candidates(listing, &MemoryLedger::default(), OrderingPolicy::ByName);
        assert_eq!(names(&selection), vec!["ok.mp4"]);
        assert_eq!(selection.rejected, 1);
    }
}
