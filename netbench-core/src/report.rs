//! Result of a completed run.

use std::time::Duration;

use serde::Serialize;

use crate::config::{BenchmarkConfiguration, BenchmarkMode, TransportKind};
use crate::counters::BenchmarkSnapshot;
use crate::state::PhaseTransition;
use crate::teardown::TeardownSummary;

/// Everything a successful run produced.
///
/// `snapshot` is taken after every adapter has been stopped, so it never
/// changes afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub transport: TransportKind,
    pub mode: BenchmarkMode,
    pub clients: usize,
    pub parallel_messages: usize,
    pub message_byte_size: usize,
    pub message_target: u64,
    pub snapshot: BenchmarkSnapshot,
    /// From the start of warming to the sample that reached the target.
    pub elapsed: Duration,
    /// Messages injected by the initial burst.
    pub burst_messages: u64,
    pub teardown: TeardownSummary,
    pub timeline: Vec<PhaseTransition>,
}

impl RunReport {
    pub(crate) fn new(
        config: &BenchmarkConfiguration,
        snapshot: BenchmarkSnapshot,
        elapsed: Duration,
        burst_messages: u64,
        teardown: TeardownSummary,
        timeline: Vec<PhaseTransition>,
    ) -> Self {
        Self {
            transport: config.transport,
            mode: config.mode,
            clients: config.clients,
            parallel_messages: config.parallel_messages,
            message_byte_size: config.message_size.bytes(),
            message_target: config.message_target,
            snapshot,
            elapsed,
            burst_messages,
            teardown,
            timeline,
        }
    }

    /// Client round trips completed per second.
    pub fn messages_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.snapshot.messages_client_received as f64 / secs
        } else {
            0.0
        }
    }

    /// Payload bytes moved per second, both directions.
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.snapshot.total_received() as f64 * self.message_byte_size as f64) / secs
        } else {
            0.0
        }
    }

    /// Mean round-trip time implied by a constant in-flight window.
    ///
    /// Each of the `clients * parallel_messages` slots completes
    /// `received / window` round trips over `elapsed`.
    pub fn avg_round_trip(&self) -> Duration {
        let window = (self.clients as u64).saturating_mul(self.parallel_messages as u64);
        let received = self.snapshot.messages_client_received;
        if received == 0 || window == 0 {
            return Duration::ZERO;
        }
        self.elapsed.mul_f64(window as f64 / received as f64)
    }
}
