// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metrics types for benchmark series results.
//!
//! A [`BenchmarkResult`] summarises one series: the distribution of run
//! durations and implied round-trip times, aggregate throughput, summed
//! counters, allocation pressure and every failed run.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use netbench_core::{
    BenchmarkConfiguration, BenchmarkMode, BenchmarkPhase, BenchmarkSnapshot, FailureKind,
    TransportKind,
};
use serde::Serialize;
use sysinfo::System;
use uuid::Uuid;

use crate::harness::{FailedRun, SeriesOutcome};

/// Distribution statistics over a set of samples.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
    /// Sorted samples, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u64>>,
}

impl LatencyMetrics {
    /// Compute statistics over durations.
    pub fn from_durations(durations: impl IntoIterator<Item = Duration>, keep_raw: bool) -> Self {
        let mut samples: Vec<u64> = durations
            .into_iter()
            .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
            .collect();
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();

        let len = samples.len() as f64;
        let mean_ns = samples.iter().map(|&s| s as f64).sum::<f64>() / len;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean_ns).powi(2))
            .sum::<f64>()
            / len;

        Self {
            min_ns: samples[0],
            max_ns: samples[samples.len() - 1],
            mean_ns,
            median_ns: percentile(&samples, 0.50),
            p95_ns: percentile(&samples, 0.95),
            p99_ns: percentile(&samples, 0.99),
            std_dev_ns: variance.sqrt(),
            samples: keep_raw.then_some(samples),
        }
    }

    /// Format nanoseconds in human-readable form (auto-selects ns/μs/ms/s).
    pub fn format_latency(ns: u64) -> String {
        match ns {
            0..=999 => format!("{}ns", ns),
            1_000..=999_999 => format!("{:.2}μs", ns as f64 / 1e3),
            1_000_000..=999_999_999 => format!("{:.2}ms", ns as f64 / 1e6),
            _ => format!("{:.2}s", ns as f64 / 1e9),
        }
    }
}

/// Nearest-rank percentile over sorted, non-empty samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate throughput over every successful run of a series.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThroughputMetrics {
    /// Client round trips per second
    pub messages_per_sec: f64,
    /// Payload bytes per second, both directions
    pub bytes_per_sec: f64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn calculate(messages: u64, bytes: u64, duration: Duration) -> Self {
        let secs = duration.as_secs_f64();
        let rate = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        Self {
            messages_per_sec: rate(messages),
            bytes_per_sec: rate(bytes),
            total_messages: messages,
            total_bytes: bytes,
            duration_ns: duration.as_nanos().min(u64::MAX as u128) as u64,
        }
    }

    /// Format a byte rate in human-readable form.
    pub fn format_bytes_per_sec(bps: f64) -> String {
        if bps < 1e3 {
            format!("{:.2} B/s", bps)
        } else if bps < 1e6 {
            format!("{:.2} KB/s", bps / 1e3)
        } else if bps < 1e9 {
            format!("{:.2} MB/s", bps / 1e6)
        } else {
            format!("{:.2} GB/s", bps / 1e9)
        }
    }
}

/// Allocation pressure per measured run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocationMetrics {
    pub mean_allocations: f64,
    pub mean_bytes: f64,
    /// Allocations per client round trip
    pub allocations_per_message: f64,
}

/// A run that failed, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub iteration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BenchmarkPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<BenchmarkSnapshot>,
    pub message: String,
}

impl From<&FailedRun> for FailureRecord {
    fn from(run: &FailedRun) -> Self {
        Self {
            iteration: run.iteration,
            phase: run.failure.as_ref().map(|f| f.phase),
            kind: run.failure.as_ref().map(|f| f.kind.clone()),
            counters: run.failure.as_ref().map(|f| f.snapshot),
            message: run.message.clone(),
        }
    }
}

/// Workload parameters echoed into the result.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadSummary {
    pub transport: TransportKind,
    pub mode: BenchmarkMode,
    pub clients: usize,
    pub parallel_messages: usize,
    pub message_byte_size: usize,
    pub message_target: u64,
}

impl From<&BenchmarkConfiguration> for WorkloadSummary {
    fn from(config: &BenchmarkConfiguration) -> Self {
        Self {
            transport: config.transport,
            mode: config.mode,
            clients: config.clients,
            parallel_messages: config.parallel_messages,
            message_byte_size: config.message_size.bytes(),
            message_target: config.message_target,
        }
    }
}

/// System information captured at benchmark time.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
    pub hostname: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        let unknown = || "Unknown".to_string();

        Self {
            os: System::name().unwrap_or_else(unknown),
            os_version: System::os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(unknown),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(unknown),
        }
    }
}

/// Summary of one benchmark series.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub workload: WorkloadSummary,
    /// Measured runs attempted
    pub iterations: u64,
    pub succeeded: u64,
    /// Run durations, warming start to target reached
    pub duration: LatencyMetrics,
    /// Per-run mean round-trip time implied by the in-flight window
    pub round_trip: LatencyMetrics,
    pub throughput: ThroughputMetrics,
    /// Counters summed over successful runs
    pub counters: BenchmarkSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocations: Option<AllocationMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BenchmarkResult {
    /// Summarise a series run against `config`.
    pub fn from_series(
        name: impl Into<String>,
        config: &BenchmarkConfiguration,
        outcome: &SeriesOutcome,
        keep_raw_samples: bool,
    ) -> Self {
        let reports = || outcome.runs.iter().map(|run| &run.report);

        let mut counters = BenchmarkSnapshot::default();
        let mut total_elapsed = Duration::ZERO;
        let mut total_bytes = 0u64;
        for report in reports() {
            let s = &report.snapshot;
            counters.messages_client_sent += s.messages_client_sent;
            counters.messages_client_received += s.messages_client_received;
            counters.messages_server_sent += s.messages_server_sent;
            counters.messages_server_received += s.messages_server_received;
            counters.errors += s.errors;
            total_elapsed += report.elapsed;
            total_bytes += s.total_received() * report.message_byte_size as u64;
        }

        let tracked: Vec<_> = outcome.runs.iter().filter_map(|r| r.allocations).collect();
        let allocations = (!tracked.is_empty()).then(|| {
            let runs = tracked.len() as f64;
            let count: u64 = tracked.iter().map(|a| a.allocations).sum();
            let bytes: u64 = tracked.iter().map(|a| a.bytes).sum();
            AllocationMetrics {
                mean_allocations: count as f64 / runs,
                mean_bytes: bytes as f64 / runs,
                allocations_per_message: if counters.messages_client_received > 0 {
                    count as f64 / counters.messages_client_received as f64
                } else {
                    0.0
                },
            }
        });

        Self {
            name: name.into(),
            workload: WorkloadSummary::from(config),
            iterations: outcome.attempted(),
            succeeded: outcome.runs.len() as u64,
            duration: LatencyMetrics::from_durations(reports().map(|r| r.elapsed), keep_raw_samples),
            round_trip: LatencyMetrics::from_durations(
                reports().map(|r| r.avg_round_trip()),
                keep_raw_samples,
            ),
            throughput: ThroughputMetrics::calculate(
                counters.messages_client_received,
                total_bytes,
                total_elapsed,
            ),
            counters,
            allocations,
            failures: outcome.failures.iter().map(FailureRecord::from).collect(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the result. Values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

/// Complete benchmark suite report.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub id: Uuid,
    pub benchmark_suite: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            benchmark_suite: "netbench".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }
}

impl Default for BenchmarkReport {
    fn default() -> Self {
        Self::new()
    }
}
