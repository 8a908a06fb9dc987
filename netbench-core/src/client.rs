// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Echo clients and the pool that drives them.
//!
//! Each [`EchoClient`] owns one client adapter and tracks its own connection
//! state from the adapter's events. The [`ClientPool`] fans lifecycle
//! commands out to every client and tracks connection progress in a watch
//! channel, so waiting for connections needs no polling.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::BenchmarkConfiguration;
use crate::counters::{BenchmarkData, Role};
use crate::echo::{EchoOutcome, EchoPolicy};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::state::{AtomicConnectionState, ConnectionState};
use crate::teardown::{bounded, TeardownOutcome, TeardownSummary};
use crate::transport::{ClientAdapter, DisconnectReason, PeerLink, Transport, TransportEvents};
use crate::types::{ClientId, PeerId};

/// Pool-wide connection progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectProgress {
    /// Clients currently connected.
    pub connected: usize,
    /// Connection attempts that failed outright.
    pub failed: usize,
}

/// Connection state plus the pool-wide progress it feeds.
#[derive(Debug)]
struct ClientStatus {
    state: AtomicConnectionState,
    progress: Arc<watch::Sender<ConnectProgress>>,
    disposed: AtomicBool,
}

impl ClientStatus {
    /// Swap in a new state, keeping the connected count in step.
    fn set(&self, next: ConnectionState) -> ConnectionState {
        let prev = self.state.swap(next);
        let was = prev == ConnectionState::Connected;
        let now = next == ConnectionState::Connected;
        if !was && now {
            self.progress.send_modify(|p| p.connected += 1);
        } else if was && !now {
            self.progress
                .send_modify(|p| p.connected = p.connected.saturating_sub(1));
        }
        prev
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Event handler registered with a client adapter.
struct ClientEvents {
    id: ClientId,
    policy: EchoPolicy,
    status: Arc<ClientStatus>,
}

impl TransportEvents for ClientEvents {
    fn on_connected(&self, peer: Arc<dyn PeerLink>) {
        if self.status.is_disposed() {
            return;
        }
        self.status.set(ConnectionState::Connected);
        debug!(client = %self.id, peer = %peer.id(), "Client connected");
    }

    fn on_disconnected(&self, peer: PeerId, reason: DisconnectReason) {
        if self.status.is_disposed() {
            return;
        }
        self.status.set(ConnectionState::Disconnected);
        if reason == DisconnectReason::ConnectionFailed {
            self.status.progress.send_modify(|p| p.failed += 1);
        }
        self.policy.on_disconnected(peer, reason);
    }

    fn on_message_received(&self, peer: &dyn PeerLink, bytes: &[u8]) {
        if self.status.is_disposed() {
            return;
        }
        if self.policy.on_message(peer, bytes) == EchoOutcome::SendFailed {
            debug!(client = %self.id, peer = %peer.id(), "Echo not queued, peer closing");
        }
    }

    fn on_error(&self, endpoint: Option<SocketAddr>, error: &TransportError) {
        if self.status.is_disposed() {
            return;
        }
        self.policy.on_error(endpoint, error);
    }
}

/// One simulated client.
pub struct EchoClient {
    id: ClientId,
    status: Arc<ClientStatus>,
    events: Arc<ClientEvents>,
    adapter: Mutex<Box<dyn ClientAdapter>>,
    parallel_messages: usize,
}

impl EchoClient {
    fn new(
        id: ClientId,
        adapter: Box<dyn ClientAdapter>,
        policy: EchoPolicy,
        parallel_messages: usize,
        progress: Arc<watch::Sender<ConnectProgress>>,
    ) -> Self {
        let status = Arc::new(ClientStatus {
            state: AtomicConnectionState::default(),
            progress,
            disposed: AtomicBool::new(false),
        });
        let events = Arc::new(ClientEvents {
            id,
            policy,
            status: Arc::clone(&status),
        });
        Self {
            id,
            status,
            events,
            adapter: Mutex::new(adapter),
            parallel_messages,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_disposed(&self) -> bool {
        self.status.is_disposed()
    }

    /// Begin connecting. Returns once the adapter has been started.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }
        self.status.set(ConnectionState::Connecting);
        let events: Arc<dyn TransportEvents> = self.events.clone();
        self.adapter.lock().await.start(events);
        Ok(())
    }

    /// Inject the initial burst of `parallel_messages` messages.
    ///
    /// A failure is counted as an error while the run is active.
    pub async fn start_sending(&self) -> Result<usize, TransportError> {
        let policy = &self.events.policy;
        let result = if self.is_disposed() {
            Err(TransportError::Disposed)
        } else if !self.is_connected() {
            Err(TransportError::NotConnected)
        } else {
            self.adapter
                .lock()
                .await
                .send_burst(self.parallel_messages, policy.payload())
        };

        match result {
            Ok(sent) => {
                policy.data().record_sent(Role::Client, sent as u64);
                Ok(sent)
            }
            Err(e) => {
                policy.on_error(None, &e);
                Err(e)
            }
        }
    }

    /// Close the connection, bounded by `bound`. Skipped unless connected.
    pub async fn disconnect(&self, bound: Duration) -> TeardownOutcome {
        if !self.is_connected() {
            return TeardownOutcome::Skipped;
        }
        self.status.set(ConnectionState::Disconnecting);

        let label = self.id.to_string();
        let outcome = bounded("disconnect", &label, bound, async {
            self.adapter.lock().await.disconnect().await;
        })
        .await;
        if outcome == TeardownOutcome::Completed {
            self.status.set(ConnectionState::Disconnected);
        }
        outcome
    }

    /// Stop the adapter and detach from its events, bounded by `bound`.
    pub async fn stop(&self, bound: Duration) -> TeardownOutcome {
        if self.is_disposed() {
            return TeardownOutcome::Skipped;
        }

        let label = self.id.to_string();
        let outcome = bounded("stop", &label, bound, async {
            self.adapter.lock().await.stop().await;
        })
        .await;

        self.status.disposed.store(true, Ordering::Release);
        self.status.set(ConnectionState::Disconnected);
        outcome
    }
}

/// All clients of one run.
pub struct ClientPool {
    clients: Vec<Arc<EchoClient>>,
    progress: watch::Receiver<ConnectProgress>,
}

impl ClientPool {
    /// Build `config.clients` clients, each with its own adapter.
    pub fn new(
        transport: &dyn Transport,
        config: &Arc<BenchmarkConfiguration>,
        data: &Arc<BenchmarkData>,
        payload: &Payload,
    ) -> Self {
        let (tx, progress) = watch::channel(ConnectProgress::default());
        let tx = Arc::new(tx);

        let clients = (0..config.clients)
            .map(|index| {
                let id = ClientId::new(index);
                let policy = EchoPolicy::new(
                    Role::Client,
                    Arc::clone(data),
                    payload.clone(),
                    config.verify_echo,
                );
                Arc::new(EchoClient::new(
                    id,
                    transport.create_client(id, config),
                    policy,
                    config.parallel_messages,
                    Arc::clone(&tx),
                ))
            })
            .collect();

        Self { clients, progress }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clients(&self) -> &[Arc<EchoClient>] {
        &self.clients
    }

    pub fn connected_count(&self) -> usize {
        self.progress.borrow().connected
    }

    pub fn progress(&self) -> ConnectProgress {
        *self.progress.borrow()
    }

    pub async fn start_all(&self) {
        for client in &self.clients {
            if let Err(e) = client.start().await {
                warn!(client = %client.id(), error = %e, "Failed to start client");
            }
        }
        debug!(clients = self.clients.len(), "All clients started");
    }

    /// Wait until every client is connected, for at most `limit`.
    ///
    /// Returns early with `false` once any connection attempt has failed,
    /// since clients never retry.
    pub async fn wait_until_all_connected(&self, limit: Duration) -> bool {
        let expected = self.clients.len();
        let mut progress = self.progress.clone();
        // Expiry is not an error here; the outcome is read back below.
        let _ = tokio::time::timeout(
            limit,
            progress.wait_for(|p| p.connected >= expected || p.failed > 0),
        )
        .await;

        let reached = self.progress();
        if reached.failed > 0 {
            warn!(
                failed = reached.failed,
                connected = reached.connected,
                expected,
                "Client connections failed"
            );
        }
        reached.failed == 0 && reached.connected >= expected
    }

    /// Inject the initial burst on every client. Returns messages queued.
    pub async fn start_sending_all(&self) -> u64 {
        let mut queued = 0u64;
        for client in &self.clients {
            match client.start_sending().await {
                Ok(sent) => queued += sent as u64,
                Err(e) => warn!(client = %client.id(), error = %e, "Initial burst failed"),
            }
        }
        info!(messages = queued, "Initial burst injected");
        queued
    }

    /// Disconnect every client concurrently, each bounded by `bound`.
    pub async fn disconnect_all(&self, bound: Duration) -> TeardownSummary {
        self.fan_out(|client| async move { client.disconnect(bound).await })
            .await
    }

    /// Stop every client concurrently, each bounded by `bound`.
    pub async fn stop_all(&self, bound: Duration) -> TeardownSummary {
        self.fan_out(|client| async move { client.stop(bound).await })
            .await
    }

    async fn fan_out<F, Fut>(&self, op: F) -> TeardownSummary
    where
        F: Fn(Arc<EchoClient>) -> Fut,
        Fut: std::future::Future<Output = TeardownOutcome> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for client in &self.clients {
            tasks.spawn(op(Arc::clone(client)));
        }

        let mut summary = TeardownSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "Client teardown task failed");
                    summary.record(TeardownOutcome::Failed);
                }
            }
        }
        summary
    }
}
