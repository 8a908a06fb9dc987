// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The fixed-size message every client round-trips.
//!
//! Built once per run and shared by reference: cloning a [`Payload`] bumps a
//! reference count, it never copies the bytes.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::TransportError;
use crate::types::MessageSize;

/// Read-only message buffer shared across every client and the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Arc<[u8]>,
    checksum: u32,
}

impl Payload {
    /// Generate a payload of the given size with a deterministic byte pattern.
    pub fn generate(size: MessageSize) -> Self {
        // 251 is prime, so the pattern does not line up with power-of-two
        // buffer boundaries.
        let bytes: Vec<u8> = (0..size.bytes()).map(|i| (i % 251) as u8).collect();
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let checksum = crc32fast::hash(&bytes);
        Self { bytes, checksum }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Check that a received frame is an intact echo of this payload.
    pub fn verify_echo(&self, received: &[u8]) -> Result<(), TransportError> {
        let actual = crc32fast::hash(received);
        if actual != self.checksum {
            return Err(TransportError::PayloadMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Whether two handles share one buffer.
    pub fn shares_buffer_with(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
