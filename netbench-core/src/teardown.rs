//! Bounded teardown of adapters.
//!
//! Every disconnect and stop the engine issues runs under a timeout. An
//! operation that overruns is logged and abandoned; it never blocks the
//! rest of the teardown.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Result of one bounded teardown operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    Completed,
    /// Nothing to tear down.
    Skipped,
    TimedOut,
    /// The teardown task itself failed.
    Failed,
}

/// Tally of teardown outcomes across many instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    pub completed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl TeardownSummary {
    pub fn record(&mut self, outcome: TeardownOutcome) {
        match outcome {
            TeardownOutcome::Completed => self.completed += 1,
            TeardownOutcome::Skipped => self.skipped += 1,
            TeardownOutcome::TimedOut => self.timed_out += 1,
            TeardownOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: TeardownSummary) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
    }

    /// Whether every operation finished within its bound.
    pub fn is_clean(&self) -> bool {
        self.timed_out == 0 && self.failed == 0
    }
}

/// Run `op` for at most `bound`, logging when it overruns.
pub async fn bounded<F>(what: &str, instance: &str, bound: Duration, op: F) -> TeardownOutcome
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(bound, op).await {
        Ok(()) => TeardownOutcome::Completed,
        Err(_) => {
            warn!(
                operation = what,
                instance,
                bound_ms = bound.as_millis() as u64,
                "Teardown timed out"
            );
            TeardownOutcome::TimedOut
        }
    }
}
