// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! NetBench Benchmarking Framework
//!
//! Runs series of echo benchmarks and turns them into JSON reports.
//!
//! # Series
//!
//! - **Performance**: many clients, small messages, large message target
//! - **Garbage**: small fixed workload, allocation pressure per run
//! - **Custom**: any configuration loaded from YAML
//!
//! # Data Output
//!
//! Every series produces one [`BenchmarkResult`] with run duration and
//! round-trip distributions, aggregate throughput, summed counters and, when
//! [`CountingAllocator`] is installed, allocation metrics.

pub mod alloc;
pub mod harness;
pub mod metrics;
pub mod reporter;

pub use alloc::{AllocationStats, CountingAllocator};
pub use harness::{BenchmarkHarness, SeriesOutcome};
pub use metrics::{
    AllocationMetrics, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::{JsonReporter, ReporterError};
