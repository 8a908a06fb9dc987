// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! A run is described by one immutable [`BenchmarkConfiguration`]. It is
//! either loaded from YAML through [`ConfigLoader`] or built from a
//! [`RawBenchmarkConfig`] in code. Any invalid field results in a
//! `HardValidationError` before a single connection is opened.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, NetBenchError, NetBenchResult};
use crate::types::{MessageSize, Port, TickRate};

const MAX_CLIENTS: usize = 10_000;
const MAX_PARALLEL_MESSAGES: usize = 10_000;

/// Which transport adapter family drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Tokio TCP sockets.
    Tcp,
    /// In-process channels, no sockets involved.
    Loopback,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::Tcp, TransportKind::Loopback];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Loopback => "loopback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "loopback" => Ok(Self::Loopback),
            other => Err(HardValidationError::InvalidFieldValue {
                field: "transport",
                value: other.to_string(),
                reason: "Expected one of: tcp, loopback".to_string(),
            }),
        }
    }
}

/// What a run is primarily measuring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMode {
    /// Throughput under a large client population.
    Performance,
    /// Allocation pressure under a small, fixed workload.
    Garbage,
    /// Fully user supplied parameters.
    #[default]
    Custom,
}

impl BenchmarkMode {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Garbage => "garbage",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BenchmarkMode {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "garbage" => Ok(Self::Garbage),
            "custom" => Ok(Self::Custom),
            other => Err(HardValidationError::InvalidFieldValue {
                field: "mode",
                value: other.to_string(),
                reason: "Expected one of: performance, garbage, custom".to_string(),
            }),
        }
    }
}

/// Raw configuration as parsed from YAML (before validation).
///
/// Every field has a default, so a YAML file only needs the values it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBenchmarkConfig {
    pub transport: TransportKind,
    pub mode: BenchmarkMode,
    pub address: String,
    pub port: u16,
    pub clients: usize,
    pub parallel_messages: usize,
    pub message_byte_size: usize,
    pub tick_rate_server: u32,
    pub tick_rate_client: u32,
    pub message_target: u64,
    pub connect_timeout_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub max_duration_ms: u64,
    pub sample_interval_ms: u64,
    pub verify_echo: bool,
}

impl Default for RawBenchmarkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            mode: BenchmarkMode::Custom,
            address: Ipv4Addr::LOCALHOST.to_string(),
            port: 3333,
            clients: 500,
            parallel_messages: 1,
            message_byte_size: 32,
            tick_rate_server: 60,
            tick_rate_client: 60,
            message_target: 100_000,
            connect_timeout_ms: 10_000,
            inactivity_timeout_ms: 10_000,
            disconnect_timeout_ms: 5_000,
            stop_timeout_ms: 5_000,
            max_duration_ms: 60_000,
            sample_interval_ms: 1,
            verify_echo: false,
        }
    }
}

impl RawBenchmarkConfig {
    /// The predefined workload for a benchmark mode.
    pub fn predefined(mode: BenchmarkMode) -> Self {
        let base = Self {
            mode,
            ..Self::default()
        };
        match mode {
            BenchmarkMode::Performance => Self {
                clients: 100,
                parallel_messages: 10,
                message_byte_size: 32,
                message_target: 500_000,
                ..base
            },
            BenchmarkMode::Garbage => Self {
                clients: 10,
                parallel_messages: 10,
                message_byte_size: 128,
                message_target: 10_000,
                ..base
            },
            BenchmarkMode::Custom => base,
        }
    }
}

/// Bounds applied to every suspension point of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutConfig {
    /// Wait for the server to listen and every client to connect.
    pub connect: Duration,
    /// Idle time after which an adapter drops a connection as timed out.
    pub inactivity: Duration,
    /// Bound on each client's disconnect during draining.
    pub disconnect: Duration,
    /// Bound on each adapter's stop during draining.
    pub stop: Duration,
    /// Hard upper bound on the measuring phase.
    pub max_duration: Duration,
}

/// Validated, immutable benchmark configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkConfiguration {
    pub transport: TransportKind,
    pub mode: BenchmarkMode,
    pub address: IpAddr,
    pub port: Port,
    pub clients: usize,
    pub parallel_messages: usize,
    pub message_size: MessageSize,
    pub tick_rate_server: TickRate,
    pub tick_rate_client: TickRate,
    pub message_target: u64,
    pub timeouts: TimeoutConfig,
    pub sample_interval: Duration,
    pub verify_echo: bool,
}

impl BenchmarkConfiguration {
    /// Validate a raw configuration.
    pub fn from_raw(raw: RawBenchmarkConfig) -> Result<Self, HardValidationError> {
        let address = parse_address(&raw.address)?;
        let port = Port::new(raw.port)?;

        check_range("clients", raw.clients as u64, 1, MAX_CLIENTS as u64)?;
        check_range(
            "parallel_messages",
            raw.parallel_messages as u64,
            1,
            MAX_PARALLEL_MESSAGES as u64,
        )?;
        let message_size = MessageSize::new(raw.message_byte_size)?;
        let tick_rate_server = TickRate::new(raw.tick_rate_server)?;
        let tick_rate_client = TickRate::new(raw.tick_rate_client)?;
        check_range("message_target", raw.message_target, 1, u64::MAX)?;

        for (field, value) in [
            ("connect_timeout_ms", raw.connect_timeout_ms),
            ("inactivity_timeout_ms", raw.inactivity_timeout_ms),
            ("disconnect_timeout_ms", raw.disconnect_timeout_ms),
            ("stop_timeout_ms", raw.stop_timeout_ms),
            ("max_duration_ms", raw.max_duration_ms),
            ("sample_interval_ms", raw.sample_interval_ms),
        ] {
            if value == 0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: "0".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if raw.sample_interval_ms > raw.max_duration_ms {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sample_interval_ms",
                value: raw.sample_interval_ms.to_string(),
                reason: format!(
                    "Sample interval must not exceed max_duration_ms ({})",
                    raw.max_duration_ms
                ),
            });
        }

        Ok(Self {
            transport: raw.transport,
            mode: raw.mode,
            address,
            port,
            clients: raw.clients,
            parallel_messages: raw.parallel_messages,
            message_size,
            tick_rate_server,
            tick_rate_client,
            message_target: raw.message_target,
            timeouts: TimeoutConfig {
                connect: Duration::from_millis(raw.connect_timeout_ms),
                inactivity: Duration::from_millis(raw.inactivity_timeout_ms),
                disconnect: Duration::from_millis(raw.disconnect_timeout_ms),
                stop: Duration::from_millis(raw.stop_timeout_ms),
                max_duration: Duration::from_millis(raw.max_duration_ms),
            },
            sample_interval: Duration::from_millis(raw.sample_interval_ms),
            verify_echo: raw.verify_echo,
        })
    }

    /// Server endpoint every client connects to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port.value())
    }

    /// Messages kept in flight across the whole pool once the burst is out.
    pub fn in_flight_window(&self) -> u64 {
        (self.clients as u64).saturating_mul(self.parallel_messages as u64)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), HardValidationError> {
    if !(min..=max).contains(&value) {
        return Err(HardValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_address(address: &str) -> Result<IpAddr, HardValidationError> {
    if address.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    address
        .parse()
        .map_err(|e: std::net::AddrParseError| HardValidationError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> NetBenchResult<BenchmarkConfiguration> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(NetBenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| NetBenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> NetBenchResult<BenchmarkConfiguration> {
        let raw = Self::parse_raw(content)?;
        Ok(BenchmarkConfiguration::from_raw(raw)?)
    }

    /// Parse YAML without validating, so callers can apply overrides first.
    pub fn parse_raw(content: &str) -> NetBenchResult<RawBenchmarkConfig> {
        serde_yaml::from_str(content).map_err(|e| NetBenchError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
transport: loopback
mode: garbage
address: 127.0.0.1
port: 4000
clients: 10
parallel_messages: 10
message_byte_size: 128
message_target: 10000
tick_rate_client: 100
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.transport, TransportKind::Loopback);
        assert_eq!(config.mode, BenchmarkMode::Garbage);
        assert_eq!(config.port.value(), 4000);
        assert_eq!(config.clients, 10);
        assert_eq!(config.message_size.bytes(), 128);
        assert_eq!(config.tick_rate_client.hz(), 100);
        assert_eq!(config.in_flight_window(), 100);
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("clients: 4").unwrap();
        assert_eq!(config.clients, 4);
        assert_eq!(config.port.value(), 3333);
        assert_eq!(config.tick_rate_server.hz(), 60);
        assert_eq!(config.timeouts.connect, Duration::from_secs(10));
        assert!(!config.verify_echo);
    }

    #[test]
    fn test_zero_clients_rejected() {
        let result = ConfigLoader::load_string("clients: 0");
        assert!(matches!(
            result,
            Err(NetBenchError::HardValidation(HardValidationError::OutOfRange {
                field: "clients",
                ..
            }))
        ));
    }

    #[test]
    fn test_invalid_port_zero() {
        assert!(ConfigLoader::load_string("port: 0").is_err());
    }

    #[test]
    fn test_invalid_message_size() {
        assert!(ConfigLoader::load_string("message_byte_size: 0").is_err());
        assert!(ConfigLoader::load_string("message_byte_size: 70000").is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(ConfigLoader::load_string("stop_timeout_ms: 0").is_err());
    }

    #[test]
    fn test_sample_interval_bounded_by_duration() {
        let yaml = "max_duration_ms: 10\nsample_interval_ms: 20\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_invalid_address() {
        assert!(ConfigLoader::load_string("address: not-an-ip").is_err());
        let config = ConfigLoader::load_string("address: localhost").unwrap();
        assert_eq!(config.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_unknown_transport_is_parse_error() {
        let result = ConfigLoader::load_string("transport: carrier-pigeon");
        assert!(matches!(result, Err(NetBenchError::ConfigParse { .. })));
    }

    #[test]
    fn test_garbage_predefined() {
        let config =
            BenchmarkConfiguration::from_raw(RawBenchmarkConfig::predefined(BenchmarkMode::Garbage))
                .unwrap();
        assert_eq!(config.clients, 10);
        assert_eq!(config.parallel_messages, 10);
        assert_eq!(config.message_size.bytes(), 128);
        assert_eq!(config.message_target, 10_000);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("TCP".parse::<TransportKind>().unwrap(), TransportKind::Tcp);
        assert!("udp".parse::<TransportKind>().is_err());
        assert_eq!(
            "garbage".parse::<BenchmarkMode>().unwrap(),
            BenchmarkMode::Garbage
        );
    }
}
