//! NetBench Core Library
//!
//! Orchestration engine for echo throughput benchmarks. Provides the
//! transport adapter interface, shared counters, client pool, echo server,
//! configuration parsing and the phase-tracked run coordinator.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod counters;
pub mod echo;
pub mod error;
pub mod payload;
pub mod report;
pub mod server;
pub mod state;
pub mod teardown;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use client::{ClientPool, ConnectProgress, EchoClient};
pub use config::{
    BenchmarkConfiguration, BenchmarkMode, ConfigLoader, RawBenchmarkConfig, TimeoutConfig,
    TransportKind,
};
pub use coordinator::BenchmarkCoordinator;
pub use counters::{BenchmarkData, BenchmarkSnapshot, Role};
pub use error::{
    FailureKind, HardValidationError, NetBenchError, NetBenchResult, RunFailure, TransportError,
};
pub use payload::Payload;
pub use report::RunReport;
pub use server::EchoServer;
pub use state::{BenchmarkPhase, ConnectionState, PhaseMachine};
pub use teardown::{TeardownOutcome, TeardownSummary};
pub use transport::{
    transport_for, ClientAdapter, DisconnectReason, PeerLink, Transport, TransportAdapter,
    TransportEvents,
};
pub use types::{ClientId, MessageSize, PeerId, Port, TickRate};
