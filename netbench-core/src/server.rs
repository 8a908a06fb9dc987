// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The echo server instance.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::config::BenchmarkConfiguration;
use crate::counters::{BenchmarkData, Role};
use crate::echo::{EchoOutcome, EchoPolicy};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::state::{AtomicConnectionState, ConnectionState};
use crate::teardown::{bounded, TeardownOutcome};
use crate::transport::{DisconnectReason, PeerLink, Transport, TransportAdapter, TransportEvents};
use crate::types::PeerId;

struct ServerEvents {
    policy: EchoPolicy,
    state: AtomicConnectionState,
    peers: DashMap<PeerId, Option<SocketAddr>>,
    listening: watch::Sender<Option<SocketAddr>>,
}

impl TransportEvents for ServerEvents {
    fn on_listening(&self, local_addr: SocketAddr) {
        self.state.swap(ConnectionState::Connected);
        self.listening.send_replace(Some(local_addr));
        info!(addr = %local_addr, "Echo server listening");
    }

    fn on_connected(&self, peer: Arc<dyn PeerLink>) {
        self.peers.insert(peer.id(), peer.remote_addr());
        debug!(peer = %peer.id(), remote = ?peer.remote_addr(), "Peer connected");
    }

    fn on_disconnected(&self, peer: PeerId, reason: DisconnectReason) {
        self.peers.remove(&peer);
        self.policy.on_disconnected(peer, reason);
    }

    fn on_message_received(&self, peer: &dyn PeerLink, bytes: &[u8]) {
        if self.policy.on_message(peer, bytes) == EchoOutcome::SendFailed {
            debug!(peer = %peer.id(), remote = ?peer.remote_addr(), "Echo not queued, peer closing");
        }
    }

    fn on_error(&self, endpoint: Option<SocketAddr>, error: &TransportError) {
        self.policy.on_error(endpoint, error);
    }
}

/// Listens for clients and echoes every message back to its sender.
pub struct EchoServer {
    events: Arc<ServerEvents>,
    adapter: Mutex<Box<dyn TransportAdapter>>,
    listening: watch::Receiver<Option<SocketAddr>>,
}

impl EchoServer {
    pub fn new(
        transport: &dyn Transport,
        config: &Arc<BenchmarkConfiguration>,
        data: &Arc<BenchmarkData>,
        payload: &Payload,
    ) -> Self {
        let (tx, listening) = watch::channel(None);
        let events = Arc::new(ServerEvents {
            policy: EchoPolicy::new(
                Role::Server,
                Arc::clone(data),
                payload.clone(),
                config.verify_echo,
            ),
            state: AtomicConnectionState::default(),
            peers: DashMap::new(),
            listening: tx,
        });
        Self {
            events,
            adapter: Mutex::new(transport.create_server(config)),
            listening,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.events.state.load()
    }

    /// Address the listener is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.listening.borrow()
    }

    pub fn connected_peers(&self) -> usize {
        self.events.peers.len()
    }

    pub async fn start(&self) {
        self.events.state.swap(ConnectionState::Connecting);
        let events: Arc<dyn TransportEvents> = self.events.clone();
        self.adapter.lock().await.start(events);
    }

    /// Wait for the listening event, for at most `limit`.
    pub async fn wait_until_listening(&self, limit: Duration) -> Option<SocketAddr> {
        let mut listening = self.listening.clone();
        let addr = match tokio::time::timeout(limit, listening.wait_for(Option::is_some)).await {
            Ok(Ok(addr)) => *addr,
            _ => None,
        };
        addr
    }

    /// Stop listening and close every peer, bounded by `bound`.
    pub async fn stop(&self, bound: Duration) -> TeardownOutcome {
        self.events.state.swap(ConnectionState::Disconnecting);
        let outcome = bounded("stop", "server", bound, async {
            self.adapter.lock().await.stop().await;
        })
        .await;
        self.events.state.swap(ConnectionState::Disconnected);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, TransportKind};
    use crate::transport::transport_for;

    fn loopback_config(port: u16) -> Arc<BenchmarkConfiguration> {
        let yaml = format!("transport: loopback\nport: {port}\nclients: 1\n");
        Arc::new(ConfigLoader::load_string(&yaml).unwrap())
    }

    #[tokio::test]
    async fn test_server_reports_listening() {
        let config = loopback_config(5100);
        let transport = transport_for(TransportKind::Loopback);
        let data = BenchmarkData::new_shared();
        let payload = Payload::generate(config.message_size);

        let server = EchoServer::new(transport.as_ref(), &config, &data, &payload);
        assert_eq!(server.state(), ConnectionState::Disconnected);
        server.start().await;

        let addr = server
            .wait_until_listening(Duration::from_secs(1))
            .await
            .expect("listening");
        assert_eq!(addr.port(), 5100);
        assert_eq!(server.state(), ConnectionState::Connected);

        assert_eq!(
            server.stop(Duration::from_secs(1)).await,
            TeardownOutcome::Completed
        );
        assert_eq!(server.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_second_server_on_same_port_never_listens() {
        let config = loopback_config(5101);
        let transport = transport_for(TransportKind::Loopback);
        let data = BenchmarkData::new_shared();
        let payload = Payload::generate(config.message_size);

        let first = EchoServer::new(transport.as_ref(), &config, &data, &payload);
        first.start().await;
        assert!(first
            .wait_until_listening(Duration::from_secs(1))
            .await
            .is_some());

        let second = EchoServer::new(transport.as_ref(), &config, &data, &payload);
        second.start().await;
        assert!(second
            .wait_until_listening(Duration::from_millis(50))
            .await
            .is_none());

        second.stop(Duration::from_secs(1)).await;
        first.stop(Duration::from_secs(1)).await;
    }
    #[test]
    fn test_echo_to_closing_peer_counts_receive_only() {
        let config = loopback_config(5102);
        let data = BenchmarkData::new_shared();
        data.set_running(true);
        let payload = Payload::generate(config.message_size);
        let server = EchoServer::new(
            transport_for(TransportKind::Loopback).as_ref(),
            &config,
            &data,
            &payload,
        );

        let open = crate::echo::tests::RecordingPeer::new(false);
        let closing = crate::echo::tests::RecordingPeer::new(true);
        server.events.on_message_received(&open, &payload);
        server.events.on_message_received(&closing, &payload);

        let snapshot = data.snapshot();
        assert_eq!(snapshot.messages_server_received, 2);
        assert_eq!(snapshot.messages_server_sent, 1);
        assert_eq!(snapshot.errors, 0);
    }
}
