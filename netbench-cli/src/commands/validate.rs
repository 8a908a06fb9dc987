// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `netbench validate` command - Validate configuration file.

use std::path::Path;

use netbench_core::{BenchmarkConfiguration, ConfigLoader, NetBenchError};

pub fn execute(file: &Path, print: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    let content = std::fs::read_to_string(file).map_err(|e| NetBenchError::Io {
        context: "reading config file",
        source: e,
    })?;
    let validated = ConfigLoader::parse_raw(&content).and_then(|raw| {
        BenchmarkConfiguration::from_raw(raw.clone())
            .map(|config| (raw, config))
            .map_err(NetBenchError::from)
    });

    match validated {
        Ok((raw, config)) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Workload:");
            println!("  Transport:         {}", config.transport);
            println!("  Mode:              {}", config.mode);
            println!("  Server:            {}", config.socket_addr());
            println!("  Clients:           {}", config.clients);
            println!("  Parallel messages: {}", config.parallel_messages);
            println!("  Message size:      {} bytes", config.message_size.bytes());
            println!("  Message target:    {}", config.message_target);
            println!("  In-flight window:  {}", config.in_flight_window());
            println!(
                "  Max duration:      {}ms",
                config.timeouts.max_duration.as_millis()
            );
            if print {
                println!();
                print!("{}", serde_yaml::to_string(&raw)?);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
