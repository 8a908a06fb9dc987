//! Custom error types for netbench.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`
//! inside the library - every failure a run can produce is a typed variant.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::counters::BenchmarkSnapshot;
use crate::state::BenchmarkPhase;

/// Top-level error type for the benchmark engine.
#[derive(Debug, Error)]
pub enum NetBenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Invalid phase transition: {0}")]
    InvalidPhaseTransition(#[from] PhaseTransitionError),

    #[error("{0}")]
    RunFailed(Box<RunFailure>),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<RunFailure> for NetBenchError {
    fn from(failure: RunFailure) -> Self {
        Self::RunFailed(Box::new(failure))
    }
}

impl NetBenchError {
    /// The run failure carried by this error, if the run itself failed.
    pub fn run_failure(&self) -> Option<&RunFailure> {
        match self {
            Self::RunFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Hard validation errors reject a configuration before any run starts.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Field out of range: {field} = {value} (min: {min}, max: {max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Invalid address: {address} - {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// State transition errors for the coordinator phase machine.
#[derive(Debug, Error)]
pub enum PhaseTransitionError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Benchmark is in terminal phase: {phase}")]
    TerminalPhase { phase: &'static str },
}

/// Errors reported by transport adapters through the error event.
///
/// During measurement these are converted into the `errors` counter and
/// never abort a run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error on {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: SocketAddr, timeout_ms: u64 },

    #[error("Connect to {addr} failed: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    #[error("No listener on loopback port {port}")]
    NoListener { port: u16 },

    #[error("Loopback port {port} already has a listener")]
    PortInUse { port: u16 },

    #[error("Adapter is not connected")]
    NotConnected,

    #[error("Adapter has been disposed")]
    Disposed,

    #[error("Outbound queue closed")]
    QueueClosed,

    #[error("Echo payload mismatch: expected crc {expected:#010x}, got {actual:#010x}")]
    PayloadMismatch { expected: u32, actual: u32 },
}

/// Why a run ended without reaching its message target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error(
        "setup failure: {connected}/{expected} clients connected (server listening: {server_listening})"
    )]
    SetupFailure {
        connected: usize,
        expected: usize,
        server_listening: bool,
    },

    #[error("message target not reached: {received}/{target} messages within {limit_ms}ms")]
    TargetNotReached {
        received: u64,
        target: u64,
        limit_ms: u64,
    },
}

/// A failed run: the phase it failed in plus everything counted so far.
#[derive(Debug, Clone, Error)]
#[error("benchmark failed during {phase}: {kind}")]
pub struct RunFailure {
    pub phase: BenchmarkPhase,
    pub kind: FailureKind,
    pub snapshot: BenchmarkSnapshot,
    pub elapsed: Duration,
}

/// Result type alias using NetBenchError.
pub type NetBenchResult<T> = Result<T, NetBenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_display() {
        let err = HardValidationError::OutOfRange {
            field: "clients",
            value: 0,
            min: 1,
            max: 10_000,
        };
        assert!(err.to_string().contains("clients"));
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_error_chain() {
        let validation_err = HardValidationError::InvalidPort {
            port: 0,
            reason: "Port must be non-zero".to_string(),
        };
        let err: NetBenchError = validation_err.into();
        assert!(matches!(err, NetBenchError::HardValidation(_)));
        assert!(err.run_failure().is_none());
    }

    #[test]
    fn test_run_failure_reports_phase() {
        let failure = RunFailure {
            phase: BenchmarkPhase::Connecting,
            kind: FailureKind::SetupFailure {
                connected: 3,
                expected: 10,
                server_listening: true,
            },
            snapshot: BenchmarkSnapshot::default(),
            elapsed: Duration::from_secs(1),
        };
        let err: NetBenchError = failure.into();
        let message = err.to_string();
        assert!(message.contains("Connecting"));
        assert!(message.contains("3/10"));
        assert!(err.run_failure().is_some());
    }
}
