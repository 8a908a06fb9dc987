// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process loopback adapter.
//!
//! Connections are pairs of unbounded channels carrying shared [`Payload`]
//! handles, so no bytes are copied and nothing is lost. A [`LoopbackHub`]
//! maps ports to listening servers; every adapter created by one
//! [`LoopbackTransport`] shares its hub.
//!
//! Loopback is non-lossy and never times out: tick rates and the inactivity
//! timeout have no effect, so it never reports [`DisconnectReason::Timeout`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{
    next_peer_id, ClientAdapter, DisconnectReason, PeerLink, Transport, TransportAdapter,
    TransportEvents,
};
use crate::config::{BenchmarkConfiguration, TransportKind};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::types::{ClientId, PeerId};

/// A connection request handed from a client to a listening server.
struct ConnectRequest {
    client_addr: SocketAddr,
    to_client: mpsc::UnboundedSender<Payload>,
    from_client: mpsc::UnboundedReceiver<Payload>,
}

/// Registry of listening loopback servers, keyed by port.
#[derive(Default)]
pub struct LoopbackHub {
    listeners: DashMap<u16, mpsc::UnboundedSender<ConnectRequest>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.listeners.contains_key(&port)
    }

    fn listen(
        &self,
        port: u16,
    ) -> Result<mpsc::UnboundedReceiver<ConnectRequest>, TransportError> {
        match self.listeners.entry(port) {
            Entry::Occupied(_) => Err(TransportError::PortInUse { port }),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    fn unlisten(&self, port: u16) {
        self.listeners.remove(&port);
    }

    fn connect(&self, port: u16, request: ConnectRequest) -> Result<(), TransportError> {
        let listener = self
            .listeners
            .get(&port)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::NoListener { port })?;
        listener
            .send(request)
            .map_err(|_| TransportError::NoListener { port })
    }
}

/// Factory for loopback adapters sharing one hub.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> &Arc<LoopbackHub> {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }

    fn create_server(&self, config: &Arc<BenchmarkConfiguration>) -> Box<dyn TransportAdapter> {
        Box::new(LoopbackServerAdapter::new(
            Arc::clone(&self.hub),
            Arc::clone(config),
        ))
    }

    fn create_client(
        &self,
        id: ClientId,
        config: &Arc<BenchmarkConfiguration>,
    ) -> Box<dyn ClientAdapter> {
        Box::new(LoopbackClientAdapter::new(
            id,
            Arc::clone(&self.hub),
            Arc::clone(config),
        ))
    }
}

struct LoopbackPeer {
    id: PeerId,
    remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Payload>,
}

impl PeerLink for LoopbackPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        self.outbound
            .send(payload.clone())
            .map_err(|_| TransportError::QueueClosed)
    }
}

/// Deliver inbound payloads until the remote closes or shutdown is signalled.
async fn pump(
    peer: &LoopbackPeer,
    mut inbound: mpsc::UnboundedReceiver<Payload>,
    events: &dyn TransportEvents,
    mut shutdown: watch::Receiver<bool>,
) -> DisconnectReason {
    loop {
        tokio::select! {
            received = inbound.recv() => match received {
                Some(payload) => events.on_message_received(peer, &payload),
                None => return DisconnectReason::RemoteClosed,
            },
            _ = shutdown.wait_for(|stop| *stop) => return DisconnectReason::LocalRequested,
        }
    }
}

async fn join_bounded(mut task: JoinHandle<()>, bound: std::time::Duration, what: &'static str) {
    if timeout(bound, &mut task).await.is_err() {
        warn!(task = what, bound_ms = bound.as_millis() as u64, "Task did not stop in time, aborting");
        task.abort();
    }
}

/// Client side of a loopback connection.
pub struct LoopbackClientAdapter {
    id: ClientId,
    hub: Arc<LoopbackHub>,
    config: Arc<BenchmarkConfiguration>,
    peer: Arc<Mutex<Option<Arc<LoopbackPeer>>>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LoopbackClientAdapter {
    pub fn new(id: ClientId, hub: Arc<LoopbackHub>, config: Arc<BenchmarkConfiguration>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            hub,
            config,
            peer: Arc::new(Mutex::new(None)),
            shutdown,
            task: None,
        }
    }

    fn current_peer(&self) -> Option<Arc<LoopbackPeer>> {
        self.peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Synthetic address identifying this client on the hub.
    fn local_addr(&self) -> SocketAddr {
        let port = 40_000u16.wrapping_add(self.id.index() as u16);
        SocketAddr::new(self.config.address, port)
    }
}

#[async_trait]
impl TransportAdapter for LoopbackClientAdapter {
    fn start(&mut self, events: Arc<dyn TransportEvents>) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!(client = %self.id, "Client already started");
            return;
        }
        self.shutdown.send_replace(false);

        let hub = Arc::clone(&self.hub);
        let server_addr = self.config.socket_addr();
        let client_addr = self.local_addr();
        let slot = Arc::clone(&self.peer);
        let shutdown = self.shutdown.subscribe();

        self.task = Some(tokio::spawn(async move {
            let peer_id = next_peer_id();
            let (to_server, from_client) = mpsc::unbounded_channel();
            let (to_client, inbound) = mpsc::unbounded_channel();

            let request = ConnectRequest {
                client_addr,
                to_client,
                from_client,
            };
            if let Err(e) = hub.connect(server_addr.port(), request) {
                events.on_error(Some(server_addr), &e);
                events.on_disconnected(peer_id, DisconnectReason::ConnectionFailed);
                return;
            }

            let peer = Arc::new(LoopbackPeer {
                id: peer_id,
                remote: server_addr,
                outbound: to_server,
            });
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&peer));
            events.on_connected(peer.clone());

            let reason = pump(&peer, inbound, events.as_ref(), shutdown).await;

            // Release the outbound sender so the server sees the close.
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            drop(peer);
            events.on_disconnected(peer_id, reason);
        }));
    }

    async fn disconnect(&mut self) {
        if self.current_peer().is_none() {
            return;
        }
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
        }
        self.task = None;
    }

    async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            join_bounded(task, self.config.timeouts.stop, "loopback client").await;
        }
        self.peer.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl ClientAdapter for LoopbackClientAdapter {
    fn send_burst(&self, count: usize, payload: &Payload) -> Result<usize, TransportError> {
        let peer = self.current_peer().ok_or(TransportError::NotConnected)?;
        for _ in 0..count {
            peer.send(payload)?;
        }
        Ok(count)
    }
}

impl Drop for LoopbackClientAdapter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Server side: accepts connection requests from the hub.
pub struct LoopbackServerAdapter {
    hub: Arc<LoopbackHub>,
    config: Arc<BenchmarkConfiguration>,
    stop: watch::Sender<bool>,
    close_peers: watch::Sender<bool>,
    active: Arc<watch::Sender<usize>>,
    registered: bool,
    task: Option<JoinHandle<()>>,
}

impl LoopbackServerAdapter {
    pub fn new(hub: Arc<LoopbackHub>, config: Arc<BenchmarkConfiguration>) -> Self {
        let (stop, _) = watch::channel(false);
        let (close_peers, _) = watch::channel(false);
        let (active, _) = watch::channel(0usize);
        Self {
            hub,
            config,
            stop,
            close_peers,
            active: Arc::new(active),
            registered: false,
            task: None,
        }
    }

    fn unregister(&mut self) {
        if std::mem::take(&mut self.registered) {
            self.hub.unlisten(self.config.socket_addr().port());
        }
    }
}

#[async_trait]
impl TransportAdapter for LoopbackServerAdapter {
    fn start(&mut self, events: Arc<dyn TransportEvents>) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Server already started");
            return;
        }
        let addr = self.config.socket_addr();
        let mut requests = match self.hub.listen(addr.port()) {
            Ok(requests) => requests,
            Err(e) => {
                events.on_error(Some(addr), &e);
                return;
            }
        };
        self.registered = true;
        self.stop.send_replace(false);
        self.close_peers.send_replace(false);

        let mut stop = self.stop.subscribe();
        let close_peers = self.close_peers.subscribe();
        let active = Arc::clone(&self.active);

        self.task = Some(tokio::spawn(async move {
            events.on_listening(addr);
            let mut connections = JoinSet::new();

            loop {
                tokio::select! {
                    request = requests.recv() => {
                        let Some(request) = request else { break };
                        let peer = Arc::new(LoopbackPeer {
                            id: next_peer_id(),
                            remote: request.client_addr,
                            outbound: request.to_client,
                        });
                        active.send_modify(|n| *n += 1);
                        events.on_connected(peer.clone());

                        let events = Arc::clone(&events);
                        let close_peers = close_peers.clone();
                        let active = Arc::clone(&active);
                        connections.spawn(async move {
                            let reason =
                                pump(&peer, request.from_client, events.as_ref(), close_peers).await;
                            active.send_modify(|n| *n = n.saturating_sub(1));
                            events.on_disconnected(peer.id, reason);
                        });
                    }
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    _ = stop.wait_for(|stop| *stop) => break,
                }
            }

            debug!(%addr, "Loopback listener closed");
            while connections.join_next().await.is_some() {}
        }));
    }

    async fn disconnect(&mut self) {
        self.close_peers.send_replace(true);
        let mut active = self.active.subscribe();
        let _ = active.wait_for(|n| *n == 0).await;
    }

    async fn stop(&mut self) {
        self.unregister();
        self.close_peers.send_replace(true);
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            join_bounded(task, self.config.timeouts.stop, "loopback server").await;
        }
    }
}

impl Drop for LoopbackServerAdapter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_hub_rejects_second_listener() {
        let hub = LoopbackHub::new();
        let _rx = hub.listen(4000).unwrap();
        assert!(hub.is_listening(4000));
        assert!(matches!(
            hub.listen(4000),
            Err(TransportError::PortInUse { port: 4000 })
        ));
        hub.unlisten(4000);
        assert!(!hub.is_listening(4000));
    }

    #[test]
    fn test_connect_without_listener() {
        let hub = LoopbackHub::new();
        let (to_client, _) = mpsc::unbounded_channel();
        let (_, from_client) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            client_addr: "127.0.0.1:40000".parse().unwrap(),
            to_client,
            from_client,
        };
        assert!(matches!(
            hub.connect(4001, request),
            Err(TransportError::NoListener { port: 4001 })
        ));
    }
    /// Shared by the server and client adapters of one connection.
    #[derive(Default)]
    struct IdleRecorder {
        listening: watch::Sender<bool>,
        connected: watch::Sender<usize>,
        disconnects: Mutex<Vec<DisconnectReason>>,
    }

    impl TransportEvents for IdleRecorder {
        fn on_listening(&self, _local_addr: SocketAddr) {
            self.listening.send_replace(true);
        }

        fn on_connected(&self, _peer: Arc<dyn PeerLink>) {
            self.connected.send_modify(|n| *n += 1);
        }

        fn on_disconnected(&self, _peer: PeerId, reason: DisconnectReason) {
            self.disconnects.lock().unwrap().push(reason);
        }

        fn on_message_received(&self, _peer: &dyn PeerLink, _bytes: &[u8]) {}

        fn on_error(&self, _endpoint: Option<SocketAddr>, _error: &TransportError) {}
    }

    #[tokio::test]
    async fn test_idle_connection_never_times_out() {
        let yaml = "transport: loopback\nport: 4002\nclients: 1\n\
                    inactivity_timeout_ms: 30\ntick_rate_server: 1000\ntick_rate_client: 1000\n";
        let config = Arc::new(crate::config::ConfigLoader::load_string(yaml).unwrap());
        let transport = LoopbackTransport::new();
        let recorder = Arc::new(IdleRecorder::default());
        let mut listening = recorder.listening.subscribe();
        let mut connected = recorder.connected.subscribe();

        let mut server = transport.create_server(&config);
        server.start(recorder.clone());
        timeout(Duration::from_secs(1), listening.wait_for(|l| *l))
            .await
            .unwrap()
            .unwrap();

        let mut client = transport.create_client(ClientId::new(0), &config);
        client.start(recorder.clone());
        timeout(Duration::from_secs(1), connected.wait_for(|n| *n == 2))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(recorder.disconnects.lock().unwrap().is_empty());

        client.stop().await;
        server.stop().await;
        assert!(!recorder
            .disconnects
            .lock()
            .unwrap()
            .contains(&DisconnectReason::Timeout));
    }
}
