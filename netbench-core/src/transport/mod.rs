// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Transport adapter capability interface.
//!
//! A transport plugs into the engine through three traits:
//!
//! - [`Transport`]: factory creating one server adapter and N client adapters.
//! - [`TransportAdapter`] / [`ClientAdapter`]: lifecycle commands issued by the
//!   control flow (`start`, `send_burst`, `disconnect`, `stop`).
//! - [`TransportEvents`]: callbacks the adapter fires from its own tasks.
//!
//! The engine never names a concrete adapter type; [`transport_for`] maps a
//! [`TransportKind`] to a factory.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{BenchmarkConfiguration, TransportKind};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::types::{ClientId, PeerId, TickRate};

pub mod loopback;
pub mod tcp;

pub use loopback::LoopbackTransport;
pub use tcp::TcpTransport;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// No traffic within the inactivity timeout.
    Timeout,
    /// The remote side closed the connection.
    RemoteClosed,
    /// Closed by a local `disconnect` or `stop`.
    LocalRequested,
    /// The connection was never established.
    ConnectionFailed,
    /// Read or write failed mid-connection.
    Reset,
}

/// Handle to one established connection, used to send on it.
pub trait PeerLink: Send + Sync {
    fn id(&self) -> PeerId;

    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Queue one message. Never blocks; the adapter flushes on its own task.
    fn send(&self, payload: &Payload) -> Result<(), TransportError>;
}

/// Events an adapter fires from its own processing context.
///
/// Implementations are called concurrently by many adapter tasks and must
/// not block.
pub trait TransportEvents: Send + Sync {
    /// Server role only: the listener is accepting connections.
    fn on_listening(&self, _local_addr: SocketAddr) {}

    fn on_connected(&self, peer: Arc<dyn PeerLink>);

    fn on_disconnected(&self, peer: PeerId, reason: DisconnectReason);

    fn on_message_received(&self, peer: &dyn PeerLink, bytes: &[u8]);

    fn on_error(&self, endpoint: Option<SocketAddr>, error: &TransportError);
}

/// Lifecycle shared by client and server adapters.
#[async_trait]
pub trait TransportAdapter: Send {
    /// Begin connecting or listening. Returns immediately; failures are
    /// reported through [`TransportEvents::on_error`].
    fn start(&mut self, events: Arc<dyn TransportEvents>);

    /// Close established connections. Completes once they are closed.
    async fn disconnect(&mut self);

    /// Tear everything down. Bounded internally: tasks still running when
    /// the stop timeout elapses are aborted.
    async fn stop(&mut self);
}

/// Client role: additionally injects the initial burst.
pub trait ClientAdapter: TransportAdapter {
    /// Enqueue `count` copies of `payload` and flush. Only valid after the
    /// connected event; returns how many messages were queued.
    fn send_burst(&self, count: usize, payload: &Payload) -> Result<usize, TransportError>;
}

/// Factory for one transport family.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn create_server(&self, config: &Arc<BenchmarkConfiguration>) -> Box<dyn TransportAdapter>;

    fn create_client(
        &self,
        id: ClientId,
        config: &Arc<BenchmarkConfiguration>,
    ) -> Box<dyn ClientAdapter>;
}

/// Create the factory for a transport kind.
pub fn transport_for(kind: TransportKind) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Tcp => Arc::new(TcpTransport),
        TransportKind::Loopback => Arc::new(LoopbackTransport::new()),
    }
}

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique peer id.
pub(crate) fn next_peer_id() -> PeerId {
    PeerId::new(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Per-connection timing derived from the configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub frame_size: usize,
    pub tick: Duration,
    pub inactivity: Duration,
}

impl ConnectionSettings {
    pub fn new(config: &BenchmarkConfiguration, tick_rate: TickRate) -> Self {
        Self {
            frame_size: config.message_size.bytes(),
            tick: tick_rate.interval(),
            inactivity: config.timeouts.inactivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_ids_unique() {
        let a = next_peer_id();
        let b = next_peer_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_transport_for_kind() {
        assert_eq!(transport_for(TransportKind::Tcp).kind(), TransportKind::Tcp);
        assert_eq!(
            transport_for(TransportKind::Loopback).kind(),
            TransportKind::Loopback
        );
    }
}
