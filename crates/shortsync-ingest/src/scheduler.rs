//! Polling loop
//!
//! Repeats sweeps until cancelled or until a sweep count or duration bound is
//! reached. The only suspension point between sweeps is the sleep, which races
//! against a [`CancellationToken`]; a sweep that has started always finishes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Disposition, SweepFailure};
use crate::ledger::CompletionLedger;
use crate::models::SweepOutcome;
use crate::pipeline::IngestionPipeline;
use crate::sink::PublishSink;
use crate::source::RemoteSource;

/// Default sleep between sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Default sleep after a quota failure.
pub const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(3600);

/// Anything that can perform one sweep
#[async_trait]
pub trait Sweeper: Send {
    async fn sweep(&mut self) -> Result<SweepOutcome, SweepFailure>;
}

#[async_trait]
impl<S, P, L> Sweeper for IngestionPipeline<S, P, L>
where
    S: RemoteSource,
    P: PublishSink,
    L: CompletionLedger,
{
    async fn sweep(&mut self) -> Result<SweepOutcome, SweepFailure> {
        self.run_once().await
    }
}

/// Timing and bounds for the polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_interval: Duration,
    /// Start the next sweep immediately after one that published something
    pub drain_before_sleep: bool,
    pub quota_backoff: Duration,
    pub max_sweeps: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_before_sleep: false,
            quota_backoff: DEFAULT_QUOTA_BACKOFF,
            max_sweeps: None,
            max_duration: None,
        }
    }
}

/// Why the loop ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MaxSweeps,
    MaxDuration,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::MaxSweeps => f.write_str("sweep limit reached"),
            StopReason::MaxDuration => f.write_str("duration limit reached"),
        }
    }
}

/// Totals across every sweep of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sweeps: u64,
    pub failed_sweeps: u64,
    pub published: usize,
    pub stop_reason: StopReason,
}

/// Run sweeps until cancelled, a bound is hit, or a fatal failure occurs
pub async fn run<W>(
    sweeper: &mut W,
    policy: &PollPolicy,
    cancel: CancellationToken,
) -> Result<RunSummary, SweepFailure>
where
    W: Sweeper + ?Sized,
{
    let started = Instant::now();
    let mut sweeps = 0u64;
    let mut failed_sweeps = 0u64;
    let mut published = 0usize;

    let stop = |reason: StopReason, sweeps, failed_sweeps, published| {
        info!(%reason, sweeps, failed_sweeps, published, "Polling loop stopped");
        RunSummary {
            sweeps,
            failed_sweeps,
            published,
            stop_reason: reason,
        }
    };

    info!(
        poll_interval_secs = policy.poll_interval.as_secs(),
        drain = policy.drain_before_sleep,
        max_sweeps = ?policy.max_sweeps,
        max_duration_secs = ?policy.max_duration.map(|d| d.as_secs()),
        "Polling loop started"
    );

    loop {
        if cancel.is_cancelled() {
            return Ok(stop(StopReason::Cancelled, sweeps, failed_sweeps, published));
        }
        if policy.max_duration.is_some_and(|max| started.elapsed() >= max) {
            return Ok(stop(StopReason::MaxDuration, sweeps, failed_sweeps, published));
        }

        let outcome = sweeper.sweep().await;
        sweeps += 1;

        let pause = match outcome {
            Ok(SweepOutcome::NoWork(_)) => policy.poll_interval,
            Ok(SweepOutcome::Completed(report)) => {
                published += report.published.len();
                if policy.drain_before_sleep {
                    Duration::ZERO
                } else {
                    policy.poll_interval
                }
            },
            Err(failure) => {
                published += failure.report.published.len();
                failed_sweeps += 1;
                match failure.error.disposition() {
                    Disposition::Retry => {
                        warn!(error = %failure, "Sweep failed, retrying after the poll interval");
                        policy.poll_interval
                    },
                    Disposition::Backoff => {
                        warn!(
                            error = %failure,
                            backoff_secs = policy.quota_backoff.as_secs(),
                            "Publishing quota exhausted, backing off"
                        );
                        policy.quota_backoff
                    },
                    Disposition::Fatal => {
                        error!(error = %failure, "Fatal sweep failure, stopping");
                        return Err(failure);
                    },
                }
            },
        };

        if policy.max_sweeps.is_some_and(|max| sweeps >= max) {
            return Ok(stop(StopReason::MaxSweeps, sweeps, failed_sweeps, published));
        }

        if pause.is_zero() {
            continue;
        }

        let pause = match policy.max_duration {
            Some(max) => pause.min(max.saturating_sub(started.elapsed())),
            None => pause,
        };

        info!(sleep_secs = pause.as_secs(), "Sleeping until next sweep");
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(stop(StopReason::Cancelled, sweeps, failed_sweeps, published));
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
