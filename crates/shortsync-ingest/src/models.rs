//! Domain types shared by the pipeline and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest title the publishing platform accepts, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// One file visible in the remote folder
///
/// Produced fresh by every listing call and never cached across sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// File name, unique within the folder at listing time
    pub name: String,

    /// Opaque handle passed back to the source to fetch the content
    pub locator: String,

    /// Modification time, used only for ordering
    pub modified_at: DateTime<Utc>,

    /// Size in bytes, when the remote reports it
    pub size: Option<u64>,

    /// Remote content hash, when the remote reports it
    pub content_hash: Option<String>,
}

impl RemoteEntry {
    pub fn new(
        name: impl Into<String>,
        locator: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            modified_at,
            size: None,
            content_hash: None,
        }
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// Evidence that a name was already published
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionRecord {
    pub name: String,
}

/// Privacy status of a published video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
            Visibility::Public => "public",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            "public" => Ok(Visibility::Public),
            other => Err(format!(
                "invalid visibility '{}'; expected private, unlisted or public",
                other
            )),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How candidates are sequenced within a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingPolicy {
    /// Lexicographic by name, ascending
    #[default]
    ByName,
    /// Oldest modification time first, ties broken by name
    ByModifiedTime,
}

impl std::str::FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "by-name" | "name" => Ok(OrderingPolicy::ByName),
            "by-modified-time" | "modified" | "mtime" => Ok(OrderingPolicy::ByModifiedTime),
            other => Err(format!(
                "invalid ordering '{}'; expected by-name or by-modified-time",
                other
            )),
        }
    }
}

impl std::fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderingPolicy::ByName => f.write_str("by-name"),
            OrderingPolicy::ByModifiedTime => f.write_str("by-modified-time"),
        }
    }
}

/// Caller-supplied metadata defaults applied to every publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDefaults {
    /// Description template; `{name}` and `{title}` are substituted
    pub description: String,
    pub category_id: String,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

impl Default for PublishDefaults {
    fn default() -> Self {
        Self {
            description: "Auto-uploaded from Dropbox: {name}".to_string(),
            category_id: "22".to_string(),
            visibility: Visibility::Private,
            tags: vec!["shorts".to_string()],
        }
    }
}

/// Metadata handed to the publishing sink alongside a staged file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

impl PublishRequest {
    /// Derive the request for an entry from the configured defaults
    pub fn for_entry(entry: &RemoteEntry, defaults: &PublishDefaults) -> Self {
        let title = sanitize_title(entry.stem(), &entry.name);
        let description = defaults
            .description
            .replace("{name}", &entry.name)
            .replace("{title}", &title);

        Self {
            title,
            description,
            category_id: defaults.category_id.clone(),
            visibility: defaults.visibility,
            tags: defaults.tags.clone(),
        }
    }
}

fn sanitize_title(stem: &str, fallback: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .filter(|c| *c != '<' && *c != '>')
            .collect::<String>()
            .trim()
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect()
    };

    let title = clean(stem);
    if title.is_empty() {
        clean(fallback)
    } else {
        title
    }
}

/// An item that made it all the way through publish and record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedItem {
    pub name: String,
    pub published_id: String,
}

/// Counters and results for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries returned by the listing
    pub listed: usize,
    /// Entries already present in the ledger
    pub skipped: usize,
    /// Repeated names dropped from the listing
    pub duplicates: usize,
    /// Names the ledger cannot store, never published
    pub rejected: usize,
    /// Candidates left after filtering
    pub candidates: usize,
    /// Items published and recorded, in publish order
    pub published: Vec<PublishedItem>,
}

impl SweepReport {
    pub fn last_published(&self) -> Option<&str> {
        self.published.last().map(|item| item.name.as_str())
    }
}

/// Successful result of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing new in the folder; no side effects happened
    NoWork(SweepReport),
    /// Every candidate was published and recorded
    Completed(SweepReport),
}

impl SweepOutcome {
    pub fn report(&self) -> &SweepReport {
        match self {
            SweepOutcome::NoWork(report) | SweepOutcome::Completed(report) => report,
        }
    }
}
