//! Shared benchmark counters.
//!
//! The only state written by many adapter tasks at once. Every counter is a
//! relaxed `fetch_add` so the hot receive path never takes a lock; the
//! coordinator merges them into a [`BenchmarkSnapshot`] when it samples.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which side of the echo workload an instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters shared by every client and the server for one run.
#[derive(Debug, Default)]
pub struct BenchmarkData {
    messages_client_sent: AtomicU64,
    messages_client_received: AtomicU64,
    messages_server_sent: AtomicU64,
    messages_server_received: AtomicU64,
    errors: AtomicU64,
    /// Single writer (the coordinator), many readers.
    running: AtomicBool,
}

impl BenchmarkData {
    /// Fresh counters: everything zero, not running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create counters wrapped in an Arc for sharing across adapter tasks.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    #[inline]
    pub fn record_sent(&self, role: Role, count: u64) {
        match role {
            Role::Client => self.messages_client_sent.fetch_add(count, Ordering::Relaxed),
            Role::Server => self.messages_server_sent.fetch_add(count, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_received(&self, role: Role) {
        match role {
            Role::Client => self.messages_client_received.fetch_add(1, Ordering::Relaxed),
            Role::Server => self.messages_server_received.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages received by all clients; the completion metric.
    #[inline]
    pub fn client_received(&self) -> u64 {
        self.messages_client_received.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Copy every counter into a plain value.
    pub fn snapshot(&self) -> BenchmarkSnapshot {
        BenchmarkSnapshot {
            messages_client_sent: self.messages_client_sent.load(Ordering::Relaxed),
            messages_client_received: self.messages_client_received.load(Ordering::Relaxed),
            messages_server_sent: self.messages_server_sent.load(Ordering::Relaxed),
            messages_server_received: self.messages_server_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BenchmarkData`]. Immutable once taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub messages_client_sent: u64,
    pub messages_client_received: u64,
    pub messages_server_sent: u64,
    pub messages_server_received: u64,
    pub errors: u64,
}

impl BenchmarkSnapshot {
    pub fn total_sent(&self) -> u64 {
        self.messages_client_sent + self.messages_server_sent
    }

    pub fn total_received(&self) -> u64 {
        self.messages_client_received + self.messages_server_received
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
