// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so a
//! `BenchmarkConfiguration` built from them is valid by construction.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Largest message the reference transports frame: 64 KiB.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
/// Highest supported adapter tick rate in Hz.
pub const MAX_TICK_RATE: u32 = 10_000;

/// Validated network port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// Validated message size in bytes (1 byte to 64 KiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct MessageSize(usize);

impl MessageSize {
    pub fn new(bytes: usize) -> Result<Self, HardValidationError> {
        if !(1..=MAX_MESSAGE_SIZE).contains(&bytes) {
            return Err(HardValidationError::OutOfRange {
                field: "message_byte_size",
                value: bytes as u64,
                min: 1,
                max: MAX_MESSAGE_SIZE as u64,
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for MessageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl TryFrom<usize> for MessageSize {
    type Error = HardValidationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageSize> for usize {
    fn from(size: MessageSize) -> Self {
        size.0
    }
}

/// Validated adapter tick rate in Hz.
///
/// The tick interval is `max(1000 / rate, 1)` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TickRate(u32);

impl TickRate {
    pub fn new(hz: u32) -> Result<Self, HardValidationError> {
        if !(1..=MAX_TICK_RATE).contains(&hz) {
            return Err(HardValidationError::OutOfRange {
                field: "tick_rate",
                value: u64::from(hz),
                min: 1,
                max: u64::from(MAX_TICK_RATE),
            });
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }

    /// Interval between two ticks of an adapter's processing context.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from((1000 / self.0).max(1)))
    }
}

impl TryFrom<u32> for TickRate {
    type Error = HardValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TickRate> for u32 {
    fn from(rate: TickRate) -> Self {
        rate.0
    }
}

/// Index of a virtual client within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClientId(usize);

impl ClientId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Adapter-assigned identifier of one connection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PeerId(u64);

impl PeerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        assert!(Port::new(0).is_err());
        assert_eq!(Port::new(3333).unwrap().value(), 3333);
    }

    #[test]
    fn test_message_size_bounds() {
        assert!(MessageSize::new(0).is_err());
        assert!(MessageSize::new(MAX_MESSAGE_SIZE + 1).is_err());
        assert_eq!(MessageSize::new(128).unwrap().bytes(), 128);
    }

    #[test]
    fn test_tick_interval() {
        assert_eq!(
            TickRate::new(60).unwrap().interval(),
            Duration::from_millis(16)
        );
        // Rates above 1 kHz clamp to one millisecond.
        assert_eq!(
            TickRate::new(5000).unwrap().interval(),
            Duration::from_millis(1)
        );
        assert!(TickRate::new(0).is_err());
    }

    #[test]
    fn test_serde_rejects_invalid_port() {
        let result: Result<Port, _> = serde_json::from_str("0");
        assert!(result.is_err());
    }
}
