// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! NetBench CLI
//!
//! Command-line interface for running echo benchmarks.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use netbench_core::{BenchmarkMode, TransportKind};

mod commands;

/// NetBench - echo throughput benchmark over pluggable transports
#[derive(Parser)]
#[command(name = "netbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single benchmark
    Run(RunArgs),

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,

        /// Print the effective configuration with defaults applied
        #[arg(short, long)]
        print: bool,
    },
}

/// Workload options. Unset flags keep the configuration file's value, or the
/// mode's predefined value when no file is given.
#[derive(Args, Default)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Predefined workload to start from
    #[arg(short, long, default_value = "custom")]
    pub mode: BenchmarkMode,

    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    #[arg(short, long)]
    pub address: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of simulated clients
    #[arg(long)]
    pub clients: Option<usize>,

    /// Messages each client keeps in flight
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Message size in bytes
    #[arg(long)]
    pub size: Option<usize>,

    /// Client messages to receive before the run completes
    #[arg(long)]
    pub target: Option<u64>,

    #[arg(long)]
    pub tick_rate_server: Option<u32>,

    #[arg(long)]
    pub tick_rate_client: Option<u32>,

    /// Hard limit on the measuring phase
    #[arg(long)]
    pub max_duration_ms: Option<u64>,

    /// Check every echoed message against the payload checksum
    #[arg(long)]
    pub verify_echo: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate { file, print } => commands::validate::execute(&file, print),
    }
}
