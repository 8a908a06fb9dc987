// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Typed state machines for the run lifecycle and per-connection status.
//!
//! Run: Idle → Configuring → Connecting → Warming → Measuring → Draining → Stopped.
//! Connection: Disconnected → Connecting → Connected → Disconnecting → Disconnected.
//! Invalid run transitions result in PhaseTransitionError.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::PhaseTransitionError;

/// Coordinator lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BenchmarkPhase {
    /// Nothing built yet.
    Idle,
    /// Counters, payload and instances are being built.
    Configuring,
    /// Server and clients started, waiting for every connection.
    Connecting,
    /// Initial burst being injected.
    Warming,
    /// Echo traffic running, counters sampled for completion.
    Measuring,
    /// Running cleared, adapters being torn down.
    Draining,
    /// Terminal: counters frozen.
    Stopped,
}

impl BenchmarkPhase {
    /// Get the phase name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Configuring => "Configuring",
            Self::Connecting => "Connecting",
            Self::Warming => "Warming",
            Self::Measuring => "Measuring",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check if transition to the target phase is valid.
    pub fn can_transition_to(&self, target: BenchmarkPhase) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Configuring) |
            (Self::Configuring, Self::Connecting) |
            (Self::Connecting, Self::Warming) |
            // Setup failure skips measurement entirely
            (Self::Connecting, Self::Stopped) |
            (Self::Warming, Self::Measuring) |
            (Self::Measuring, Self::Draining) |
            (Self::Draining, Self::Stopped)
        )
    }
}

impl std::fmt::Display for BenchmarkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One entry of the phase timeline, relative to the machine's creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub phase: BenchmarkPhase,
    pub at: Duration,
}

/// State machine for one benchmark run.
#[derive(Debug)]
pub struct PhaseMachine {
    current: BenchmarkPhase,
    created: Instant,
    last_transition: Instant,
    timeline: Vec<PhaseTransition>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            current: BenchmarkPhase::Idle,
            created: now,
            last_transition: now,
            timeline: vec![PhaseTransition {
                phase: BenchmarkPhase::Idle,
                at: Duration::ZERO,
            }],
        }
    }

    pub fn phase(&self) -> BenchmarkPhase {
        self.current
    }

    pub fn time_in_current_phase(&self) -> Duration {
        self.last_transition.elapsed()
    }

    /// Every phase entered so far, in order.
    pub fn timeline(&self) -> &[PhaseTransition] {
        &self.timeline
    }

    /// Attempt to transition to a new phase.
    pub fn transition_to(&mut self, target: BenchmarkPhase) -> Result<(), PhaseTransitionError> {
        if self.current.is_terminal() {
            return Err(PhaseTransitionError::TerminalPhase {
                phase: self.current.name(),
            });
        }
        if !self.current.can_transition_to(target) {
            return Err(PhaseTransitionError::InvalidTransition {
                from: self.current.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current.name(),
            to = target.name(),
            in_phase_ms = self.time_in_current_phase().as_millis() as u64,
            "Phase transition"
        );

        let now = Instant::now();
        self.current = target;
        self.last_transition = now;
        self.timeline.push(PhaseTransition {
            phase: target,
            at: now.duration_since(self.created),
        });

        Ok(())
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection status of one echo client or the echo server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// [`ConnectionState`] written from adapter tasks and read by the pool.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store a new state, returning the previous one.
    pub fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}
