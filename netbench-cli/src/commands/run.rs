// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `netbench run` command - Run a single benchmark.

use netbench_core::{
    BenchmarkConfiguration, BenchmarkCoordinator, ConfigLoader, NetBenchError,
    RawBenchmarkConfig, RunReport,
};

use crate::RunArgs;

pub async fn execute(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    tracing::info!(
        transport = %config.transport,
        mode = %config.mode,
        clients = config.clients,
        parallel = config.parallel_messages,
        target = config.message_target,
        "Starting benchmark"
    );

    let mut coordinator = BenchmarkCoordinator::from_config(config);
    match coordinator.run().await {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            if let Some(failure) = e.run_failure() {
                let s = &failure.snapshot;
                eprintln!("  Phase:    {}", failure.phase);
                eprintln!("  Elapsed:  {}ms", failure.elapsed.as_millis());
                eprintln!(
                    "  Counters: client sent {} / received {}, server sent {} / received {}, errors {}",
                    s.messages_client_sent,
                    s.messages_client_received,
                    s.messages_server_sent,
                    s.messages_server_received,
                    s.errors
                );
            }
            std::process::exit(1);
        }
    }
}

/// Layer CLI flags over the configuration file or the mode's predefined values.
fn build_config(args: &RunArgs) -> Result<BenchmarkConfiguration, NetBenchError> {
    let mut raw = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| NetBenchError::Io {
                context: "reading config file",
                source: e,
            })?;
            ConfigLoader::parse_raw(&content)?
        }
        None => RawBenchmarkConfig::predefined(args.mode),
    };

    if let Some(transport) = args.transport {
        raw.transport = transport;
    }
    if let Some(address) = &args.address {
        raw.address = address.clone();
    }
    if let Some(port) = args.port {
        raw.port = port;
    }
    if let Some(clients) = args.clients {
        raw.clients = clients;
    }
    if let Some(parallel) = args.parallel {
        raw.parallel_messages = parallel;
    }
    if let Some(size) = args.size {
        raw.message_byte_size = size;
    }
    if let Some(target) = args.target {
        raw.message_target = target;
    }
    if let Some(rate) = args.tick_rate_server {
        raw.tick_rate_server = rate;
    }
    if let Some(rate) = args.tick_rate_client {
        raw.tick_rate_client = rate;
    }
    if let Some(ms) = args.max_duration_ms {
        raw.max_duration_ms = ms;
    }
    if args.verify_echo {
        raw.verify_echo = true;
    }

    Ok(BenchmarkConfiguration::from_raw(raw)?)
}

fn print_report(report: &RunReport) {
    let s = &report.snapshot;
    println!("✓ Benchmark completed");
    println!();
    println!("Workload:");
    println!(
        "  {} / {} - {} clients x {} in flight, {} byte messages",
        report.transport,
        report.mode,
        report.clients,
        report.parallel_messages,
        report.message_byte_size
    );
    println!();
    println!("Results:");
    println!("  Elapsed:           {:.3}s", report.elapsed.as_secs_f64());
    println!("  Throughput:        {:.0} msg/s", report.messages_per_sec());
    println!(
        "  Bandwidth:         {:.2} MB/s",
        report.bytes_per_sec() / 1_000_000.0
    );
    println!(
        "  Avg round trip:    {:.3}ms",
        report.avg_round_trip().as_secs_f64() * 1_000.0
    );
    println!();
    println!("Counters:");
    println!("  Client sent:       {}", s.messages_client_sent);
    println!("  Client received:   {}", s.messages_client_received);
    println!("  Server sent:       {}", s.messages_server_sent);
    println!("  Server received:   {}", s.messages_server_received);
    println!("  Errors:            {}", s.errors);
    if !report.teardown.is_clean() {
        println!();
        println!(
            "Teardown: {} timed out, {} failed",
            report.teardown.timed_out, report.teardown.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbench_core::{BenchmarkMode, TransportKind};
    use std::io::Write;

    #[test]
    fn test_flags_override_predefined_mode() {
        let args = RunArgs {
            mode: BenchmarkMode::Garbage,
            transport: Some(TransportKind::Loopback),
            clients: Some(3),
            ..RunArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.clients, 3);
        assert_eq!(config.parallel_messages, 10);
        assert_eq!(config.message_size.bytes(), 128);
        assert_eq!(config.transport, TransportKind::Loopback);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clients: 7\nport: 4100").unwrap();
        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            port: Some(4200),
            verify_echo: true,
            ..RunArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.clients, 7);
        assert_eq!(config.port.value(), 4200);
        assert!(config.verify_echo);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = RunArgs {
            size: Some(0),
            ..RunArgs::default()
        };
        assert!(matches!(
            build_config(&args),
            Err(NetBenchError::HardValidation(_))
        ));
    }
}
