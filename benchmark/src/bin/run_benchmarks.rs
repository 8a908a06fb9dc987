// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run benchmark series and generate reports.

use std::path::PathBuf;

use clap::Parser;
use netbench_benchmark::{
    BenchmarkHarness, BenchmarkReport, BenchmarkResult, CountingAllocator, JsonReporter,
    LatencyMetrics, ThroughputMetrics,
};
use netbench_core::{
    BenchmarkConfiguration, BenchmarkMode, ConfigLoader, RawBenchmarkConfig, TransportKind,
};

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run netbench series and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Measured runs per series
    #[arg(short, long, default_value_t = 10)]
    iterations: u64,

    /// Discarded runs before measuring
    #[arg(short, long, default_value_t = 1)]
    warmup: u64,

    /// Predefined modes to run (performance and garbage if not specified)
    #[arg(short, long)]
    mode: Vec<BenchmarkMode>,

    /// YAML file for an additional custom series
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport for the predefined series
    #[arg(short, long, default_value = "tcp")]
    transport: TransportKind,

    /// Server port for the predefined series
    #[arg(short, long, default_value_t = 3333)]
    port: u16,

    /// Run in quick mode (fewer iterations, targets divided by 10)
    #[arg(long)]
    quick: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let iterations = if args.quick { 2 } else { args.iterations };
    let modes = if args.mode.is_empty() {
        vec![BenchmarkMode::Performance, BenchmarkMode::Garbage]
    } else {
        args.mode.clone()
    };

    println!("NetBench Benchmark Suite");
    println!("========================");
    println!("Output directory: {:?}", args.output);
    println!("Warmup runs: {}, measured runs: {}", args.warmup, iterations);
    println!();

    let reporter = JsonReporter::new(&args.output)?;
    let harness = BenchmarkHarness::new()
        .warmup(args.warmup)
        .iterations(iterations);
    let mut report = BenchmarkReport::new();

    for mode in modes {
        let mut raw = RawBenchmarkConfig::predefined(mode);
        raw.transport = args.transport;
        raw.port = args.port;
        if args.quick {
            raw.message_target = (raw.message_target / 10).max(1);
        }
        let config = BenchmarkConfiguration::from_raw(raw)?;
        let name = format!("{}_{}", mode, config.transport);

        println!("Running {} series...", name);
        run_series(&harness, &mut report, name, &config).await;
    }

    if let Some(path) = &args.config {
        let config = ConfigLoader::load_file(path)?;
        let name = format!("{}_{}", config.mode, config.transport);
        println!("Running {} series from {:?}...", name, path);
        run_series(&harness, &mut report, name, &config).await;
    }

    let path = reporter.save(&report)?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();

    print_summary(&report);

    Ok(())
}

async fn run_series(
    harness: &BenchmarkHarness,
    report: &mut BenchmarkReport,
    name: String,
    config: &BenchmarkConfiguration,
) {
    let outcome = harness.run_series(config).await;
    let result = BenchmarkResult::from_series(&name, config, &outcome, harness.should_keep_samples())
        .with_metadata("sample_interval_ms", config.sample_interval.as_millis() as u64)
        .with_metadata("verify_echo", config.verify_echo);

    if outcome.failures.is_empty() {
        println!("  ✓ {}", name);
    } else {
        println!(
            "  ✗ {} ({} of {} runs failed)",
            name,
            outcome.failures.len(),
            outcome.attempted()
        );
    }
    report.add_result(result);
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        println!(
            "{}: {}/{} runs, median={}, p99={}, rtt={}, {:.0} msg/s, {}",
            result.name,
            result.succeeded,
            result.iterations,
            LatencyMetrics::format_latency(result.duration.median_ns),
            LatencyMetrics::format_latency(result.duration.p99_ns),
            LatencyMetrics::format_latency(result.round_trip.median_ns),
            result.throughput.messages_per_sec,
            ThroughputMetrics::format_bytes_per_sec(result.throughput.bytes_per_sec),
        );
        if let Some(alloc) = &result.allocations {
            println!(
                "    allocations: {:.0}/run, {:.0} bytes/run, {:.3}/message",
                alloc.mean_allocations, alloc.mean_bytes, alloc.allocations_per_message
            );
        }
        if result.counters.errors > 0 {
            println!("    errors: {}", result.counters.errors);
        }
    }
}
