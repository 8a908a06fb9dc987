// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for running a series of echo runs.
//!
//! Warmup runs are executed and discarded, then every measured run is
//! recorded together with the allocations it caused.

use std::future::Future;

use netbench_core::{
    BenchmarkConfiguration, BenchmarkCoordinator, NetBenchResult, RunFailure, RunReport,
};
use tracing::{info, warn};

use crate::alloc::{self, AllocationStats};

/// One measured run that reached its target.
#[derive(Debug, Clone)]
pub struct MeasuredRun {
    pub iteration: u64,
    pub report: RunReport,
    /// Allocations during the run; `None` when allocation tracking is off.
    pub allocations: Option<AllocationStats>,
}

/// One measured run that failed.
#[derive(Debug, Clone)]
pub struct FailedRun {
    pub iteration: u64,
    /// Present when the run itself failed rather than its setup code.
    pub failure: Option<RunFailure>,
    pub message: String,
}

/// Everything a series produced.
#[derive(Debug, Clone, Default)]
pub struct SeriesOutcome {
    pub runs: Vec<MeasuredRun>,
    pub failures: Vec<FailedRun>,
}

impl SeriesOutcome {
    pub fn attempted(&self) -> u64 {
        (self.runs.len() + self.failures.len()) as u64
    }
}

/// A benchmark harness for repeated runs of one configuration.
pub struct BenchmarkHarness {
    /// Runs executed before measurement and discarded
    warmup_iterations: u64,
    /// Runs recorded
    measurement_iterations: u64,
    /// Whether to keep per-run samples in the result
    keep_raw_samples: bool,
}

impl BenchmarkHarness {
    /// One warmup run and ten measured runs.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 1,
            measurement_iterations: 10,
            keep_raw_samples: true,
        }
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Set the number of measurement iterations.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_raw_samples = keep;
        self
    }

    pub fn should_keep_samples(&self) -> bool {
        self.keep_raw_samples
    }

    /// Run the series with a fresh coordinator per run.
    pub async fn run_series(&self, config: &BenchmarkConfiguration) -> SeriesOutcome {
        self.run_with(|| {
            let mut coordinator = BenchmarkCoordinator::from_config(config.clone());
            async move { coordinator.run().await }
        })
        .await
    }

    /// Run the series, calling `run` once per iteration.
    pub async fn run_with<F, Fut>(&self, mut run: F) -> SeriesOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = NetBenchResult<RunReport>>,
    {
        for iteration in 0..self.warmup_iterations {
            match run().await {
                Ok(report) => info!(
                    iteration,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Warmup run complete"
                ),
                Err(e) => warn!(iteration, error = %e, "Warmup run failed"),
            }
        }

        let tracking = alloc::is_tracking();
        let mut outcome = SeriesOutcome::default();
        for iteration in 0..self.measurement_iterations {
            let before = AllocationStats::now();
            let result = run().await;
            let allocations = tracking.then(|| AllocationStats::now().since(before));

            match result {
                Ok(report) => {
                    info!(
                        iteration,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        received = report.snapshot.messages_client_received,
                        errors = report.snapshot.errors,
                        "Run complete"
                    );
                    outcome.runs.push(MeasuredRun {
                        iteration,
                        report,
                        allocations,
                    });
                }
                Err(e) => {
                    warn!(iteration, error = %e, "Run failed");
                    outcome.failures.push(FailedRun {
                        iteration,
                        failure: e.run_failure().cloned(),
                        message: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbench_core::{RawBenchmarkConfig, TransportKind};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn small_config() -> BenchmarkConfiguration {
        BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
            transport: TransportKind::Loopback,
            clients: 2,
            parallel_messages: 2,
            message_target: 200,
            ..RawBenchmarkConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_series_discards_warmup() {
        let harness = BenchmarkHarness::new().warmup(2).iterations(3);
        let config = small_config();
        let calls = AtomicU64::new(0);

        let outcome = harness
            .run_with(|| {
                calls.fetch_add(1, Ordering::Relaxed);
                let mut coordinator = BenchmarkCoordinator::from_config(config.clone());
                async move { coordinator.run().await }
            })
            .await;

        assert_eq!(calls.load(Ordering::Relaxed), 5);
        assert_eq!(outcome.runs.len(), 3);
        assert!(outcome.failures.is_empty());
        let iterations: Vec<_> = outcome.runs.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_runs_are_recorded() {
        let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
            transport: TransportKind::Loopback,
            clients: 1,
            message_target: u64::MAX,
            max_duration_ms: 50,
            ..RawBenchmarkConfig::default()
        })
        .unwrap();

        let outcome = BenchmarkHarness::new()
            .warmup(0)
            .iterations(2)
            .run_series(&config)
            .await;

        assert!(outcome.runs.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.attempted(), 2);
        assert!(outcome.failures.iter().all(|f| f.failure.is_some()));
    }
}
