//! Error types for shortsync ingestion
//!
//! Errors are layered the same way the pipeline is: collaborator errors
//! ([`SourceError`], [`PublishError`], [`LedgerError`], ...) are wrapped by
//! [`SweepError`], which names the step and the item that failed. The binary
//! only deals with [`IngestError`], which maps onto process exit codes.

use crate::models::SweepReport;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for top-level operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Exit code for a configuration error (sysexits `EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;

/// Exit code for a rejected credential (sysexits `EX_NOPERM`).
pub const EXIT_AUTH: i32 = 77;

/// Exit code for an unrecoverable local I/O error (sysexits `EX_IOERR`).
pub const EXIT_IO: i32 = 74;

/// Exit code for any other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Failure obtaining a bearer credential
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The token endpoint refused the refresh token or client
    #[error("Token endpoint rejected the credentials: {0}")]
    Rejected(String),

    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected token response: {0}")]
    Decode(String),
}

impl CredentialError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CredentialError::Rejected(_))
    }
}

/// Failure talking to the remote listing source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Remote rejected authentication: {0}")]
    Auth(String),

    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Remote rate limit hit: {0}")]
    RateLimited(String),

    #[error("Remote returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from remote: {0}")]
    Decode(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl SourceError {
    pub fn is_auth(&self) -> bool {
        match self {
            SourceError::Auth(_) => true,
            SourceError::Credential(e) => e.is_auth(),
            _ => false,
        }
    }
}

/// Failure materializing a remote entry in the staging store
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Staging I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    ContentHash { expected: String, actual: String },

    #[error("Short transfer: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
}

/// Broad class of a publishing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    Auth,
    Quota,
    Generic,
}

/// Failure handing a staged file to the publishing sink
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publishing platform rejected authentication: {0}")]
    Auth(String),

    #[error("Publishing quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("Publishing failed: {0}")]
    Remote(String),

    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not read staged file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            PublishError::Auth(_) => PublishErrorKind::Auth,
            PublishError::Quota(_) => PublishErrorKind::Quota,
            _ => PublishErrorKind::Generic,
        }
    }
}

impl From<CredentialError> for PublishError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Rejected(msg) => PublishError::Auth(msg),
            CredentialError::Http(e) => PublishError::Http(e),
            CredentialError::Decode(msg) => PublishError::Remote(msg),
        }
    }
}

/// Failure reading or appending to the completion ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Name {0:?} cannot be stored in a line-oriented ledger")]
    InvalidName(String),
}

/// Pipeline step at which a sweep stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    List,
    Stage,
    Publish,
    Record,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Step::List => "list",
            Step::Stage => "stage",
            Step::Publish => "publish",
            Step::Record => "record",
        };
        f.write_str(s)
    }
}

/// What the scheduler should do after a failed sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again after the normal poll interval
    Retry,
    /// Try again after the extended quota back-off
    Backoff,
    /// Stop the loop
    Fatal,
}

/// Why a sweep stopped, with the failing item where there is one
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Listing folder '{folder}' failed: {source}")]
    Listing {
        folder: String,
        #[source]
        source: SourceError,
    },

    #[error("Staging '{name}' failed: {source}")]
    Transfer {
        name: String,
        #[source]
        source: TransferError,
    },

    #[error("Publishing '{name}' failed: {source}")]
    Publish {
        name: String,
        #[source]
        source: PublishError,
    },

    /// Published but not recorded; a restart may publish the item again
    #[error("'{name}' was published as {published_id} but recording it failed: {source}")]
    LedgerWrite {
        name: String,
        published_id: String,
        #[source]
        source: LedgerError,
    },
}

impl SweepError {
    pub fn step(&self) -> Step {
        match self {
            SweepError::Listing { .. } => Step::List,
            SweepError::Transfer { .. } => Step::Stage,
            SweepError::Publish { .. } => Step::Publish,
            SweepError::LedgerWrite { .. } => Step::Record,
        }
    }

    /// Name of the item being processed, if the failure was item-level
    pub fn item(&self) -> Option<&str> {
        match self {
            SweepError::Listing { .. } => None,
            SweepError::Transfer { name, .. }
            | SweepError::Publish { name, .. }
            | SweepError::LedgerWrite { name, .. } => Some(name),
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            SweepError::Listing { source, .. } => source.is_auth(),
            SweepError::Transfer {
                source: TransferError::Source(source),
                ..
            } => source.is_auth(),
            SweepError::Publish { source, .. } => source.kind() == PublishErrorKind::Auth,
            _ => false,
        }
    }

    pub fn disposition(&self) -> Disposition {
        if self.is_auth() {
            return Disposition::Fatal;
        }
        match self {
            SweepError::LedgerWrite { .. } => Disposition::Fatal,
            SweepError::Publish { source, .. } if source.kind() == PublishErrorKind::Quota => {
                Disposition::Backoff
            },
            _ => Disposition::Retry,
        }
    }
}

/// A failed sweep together with what it achieved before failing
#[derive(Error, Debug)]
#[error("Sweep stopped at {} step after publishing {}: {error}", .error.step(), .report.published.len())]
pub struct SweepFailure {
    pub report: SweepReport,
    #[source]
    pub error: SweepError,
}

/// Top-level error for the ingestion tool
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Staging directory {} unusable: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Sweep(#[from] SweepFailure),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            IngestError::Config(_) => EXIT_CONFIG,
            IngestError::Ledger(_) | IngestError::Staging { .. } => EXIT_IO,
            IngestError::Client(_) => EXIT_FAILURE,
            IngestError::Sweep(failure) => match &failure.error {
                e if e.is_auth() => EXIT_AUTH,
                SweepError::LedgerWrite { .. } => EXIT_IO,
                SweepError::Transfer {
                    source: TransferError::Io { .. },
                    ..
                } => EXIT_IO,
                _ => EXIT_FAILURE,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn failure(error: SweepError) -> IngestError {
        IngestError::Sweep(SweepFailure {
            report: SweepReport::default(),
            error,
        })
    }

    #[test]
    fn test_publish_dispositions() {
        let quota = SweepError::Publish {
            name: "b.mp4".to_string(),
            source: PublishError::Quota("quotaExceeded".to_string()),
        };
        assert_eq!(quota.disposition(), Disposition::Backoff);
        assert_eq!(quota.step(), Step::Publish);
        assert_eq!(quota.item(), Some("b.mp4"));

        let auth = SweepError::Publish {
            name: "b.mp4".to_string(),
            source: PublishError::Auth("invalid_grant".to_string()),
        };
        assert_eq!(auth.disposition(), Disposition::Fatal);

        let generic = SweepError::Publish {
            name: "b.mp4".to_string(),
            source: PublishError::Remote("backendError".to_string()),
        };
        assert_eq!(generic.disposition(), Disposition::Retry);
    }

    #[test]
    fn test_listing_dispositions() {
        let not_found = SweepError::Listing {
            folder: "/Shorts".to_string(),
            source: SourceError::NotFound("path/not_found/".to_string()),
        };
        assert_eq!(not_found.disposition(), Disposition::Retry);
        assert_eq!(not_found.item(), None);

        let auth = SweepError::Listing {
            folder: "/Shorts".to_string(),
            source: SourceError::Credential(CredentialError::Rejected("invalid_grant".to_string())),
        };
        assert_eq!(auth.disposition(), Disposition::Fatal);
    }

    #[test]
    fn test_ledger_write_is_fatal_and_io() {
        let err = SweepError::LedgerWrite {
            name: "a.mp4".to_string(),
            published_id: "vid-a".to_string(),
            source: LedgerError::InvalidName("a\nb".to_string()),
        };
        assert_eq!(err.disposition(), Disposition::Fatal);
        assert!(err.to_string().contains("vid-a"));
        assert_eq!(failure(err).exit_code(), EXIT_IO);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(IngestError::config("missing token").exit_code(), EXIT_CONFIG);

        let auth = failure(SweepError::Publish {
            name: "a.mp4".to_string(),
            source: PublishError::Auth("401".to_string()),
        });
        assert_eq!(auth.exit_code(), EXIT_AUTH);

        let remote = failure(SweepError::Publish {
            name: "a.mp4".to_string(),
            source: PublishError::Remote("500".to_string()),
        });
        assert_eq!(remote.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_failure_message_names_step_and_item() {
        let err = failure(SweepError::Transfer {
            name: "c.mp4".to_string(),
            source: TransferError::Truncated {
                expected: 10,
                received: 4,
            },
        });
        let message = err.to_string();
        assert!(message.contains("stage"));
        assert!(message.contains("c.mp4"));
    }
}
