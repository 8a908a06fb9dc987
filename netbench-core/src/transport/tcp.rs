// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! TCP reference adapter built on tokio.
//!
//! Messages travel as fixed-size frames of `message_byte_size` bytes, so no
//! length prefix is needed. Each connection runs one reader loop and one
//! writer task fed by an unbounded queue; the writer flushes whenever the
//! queue drains. The reader loop ticks at the role's tick rate to enforce the
//! inactivity timeout.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{
    next_peer_id, ClientAdapter, ConnectionSettings, DisconnectReason, PeerLink, Transport,
    TransportAdapter, TransportEvents,
};
use crate::config::{BenchmarkConfiguration, TransportKind};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::types::{ClientId, PeerId};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Factory for TCP adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn create_server(&self, config: &Arc<BenchmarkConfiguration>) -> Box<dyn TransportAdapter> {
        Box::new(TcpServerAdapter::new(Arc::clone(config)))
    }

    fn create_client(
        &self,
        id: ClientId,
        config: &Arc<BenchmarkConfiguration>,
    ) -> Box<dyn ClientAdapter> {
        Box::new(TcpClientAdapter::new(id, Arc::clone(config)))
    }
}

/// One established TCP connection.
#[derive(Debug)]
struct TcpPeer {
    id: PeerId,
    remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Payload>,
}

impl PeerLink for TcpPeer {
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

/// Splits a byte stream back into fixed-size frames.
#[derive(Debug)]
struct FrameReader {
    frame_size: usize,
    partial: Vec<u8>,
}

impl FrameReader {
    fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            partial: Vec::with_capacity(frame_size),
        }
    }

    /// Feed one chunk, calling `deliver` for every completed frame.
    fn feed(&mut self, mut chunk: &[u8], mut deliver: impl FnMut(&[u8])) {
        if !self.partial.is_empty() {
            let take = (self.frame_size - self.partial.len()).min(chunk.len());
            self.partial.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
            if self.partial.len() < self.frame_size {
                return;
            }
            deliver(&self.partial);
            self.partial.clear();
        }

        let mut frames = chunk.chunks_exact(self.frame_size);
        for frame in &mut frames {
            deliver(frame);
        }
        self.partial.extend_from_slice(frames.remainder());
    }
}

async fn write_loop(
    writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Payload>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);
    while let Some(payload) = outbound.recv().await {
        writer.write_all(&payload).await?;
        while let Ok(next) = outbound.try_recv() {
            writer.write_all(&next).await?;
        }
        writer.flush().await?;
    }
    writer.shutdown().await
}

/// Drive one connection until it closes, returning why it closed.
async fn run_connection(
    stream: TcpStream,
    peer: Arc<TcpPeer>,
    outbound: mpsc::UnboundedReceiver<Payload>,
    events: Arc<dyn TransportEvents>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) -> DisconnectReason {
    let (mut reader, writer) = stream.into_split();
    let mut writer_task = tokio::spawn(write_loop(writer, outbound));

    let mut frames = FrameReader::new(settings.frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE.max(settings.frame_size)];
    let mut ticker = interval(settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    let reason = loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break DisconnectReason::RemoteClosed,
                Ok(n) => {
                    last_activity = Instant::now();
                    frames.feed(&buf[..n], |frame| {
                        events.on_message_received(peer.as_ref(), frame)
                    });
                }
                Err(source) => {
                    events.on_error(
                        Some(peer.remote),
                        &TransportError::Io { context: "reading frame", source },
                    );
                    break DisconnectReason::Reset;
                }
            },
            written = &mut writer_task => {
                if let Ok(Err(source)) = written {
                    events.on_error(
                        Some(peer.remote),
                        &TransportError::Io { context: "writing frame", source },
                    );
                }
                break DisconnectReason::Reset;
            }
            _ = ticker.tick() => {
                if last_activity.elapsed() >= settings.inactivity {
                    break DisconnectReason::Timeout;
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => break DisconnectReason::LocalRequested,
        }
    };

    // Dropping the write half sends FIN.
    writer_task.abort();
    reason
}

/// Abort a task if it does not finish within `bound`.
async fn join_bounded(mut task: JoinHandle<()>, bound: std::time::Duration, what: &'static str) {
    if timeout(bound, &mut task).await.is_err() {
        warn!(task = what, bound_ms = bound.as_millis() as u64, "Task did not stop in time, aborting");
        task.abort();
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client side: one outbound connection.
pub struct TcpClientAdapter {
    id: ClientId,
    config: Arc<BenchmarkConfiguration>,
    peer: Arc<Mutex<Option<Arc<TcpPeer>>>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TcpClientAdapter {
    pub fn new(id: ClientId, config: Arc<BenchmarkConfiguration>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            config,
            peer: Arc::new(Mutex::new(None)),
            shutdown,
            task: None,
        }
    }

    fn current_peer(&self) -> Option<Arc<TcpPeer>> {
        self.peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TransportAdapter for TcpClientAdapter {
    fn start(&mut self, events: Arc<dyn TransportEvents>) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!(client = %self.id, "Client already started");
            return;
        }
        self.shutdown.send_replace(false);

        let config = Arc::clone(&self.config);
        let slot = Arc::clone(&self.peer);
        let shutdown = self.shutdown.subscribe();
        let client = self.id;

        self.task = Some(tokio::spawn(async move {
            let addr = config.socket_addr();
            let peer_id = next_peer_id();
            let connect_timeout = config.timeouts.connect;

            let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    events.on_error(
                        Some(addr),
                        &TransportError::ConnectFailed {
                            addr,
                            reason: e.to_string(),
                        },
                    );
                    events.on_disconnected(peer_id, DisconnectReason::ConnectionFailed);
                    return;
                }
                Err(_) => {
                    events.on_error(
                        Some(addr),
                        &TransportError::ConnectTimeout {
                            addr,
                            timeout_ms: connect_timeout.as_millis() as u64,
                        },
                    );
                    events.on_disconnected(peer_id, DisconnectReason::ConnectionFailed);
                    return;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%client, error = %e, "Failed to set TCP_NODELAY");
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let peer = Arc::new(TcpPeer {
                id: peer_id,
                remote: addr,
                outbound: tx,
            });
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&peer));
            events.on_connected(peer.clone());

            let settings = ConnectionSettings::new(&config, config.tick_rate_client);
            let reason =
                run_connection(stream, Arc::clone(&peer), rx, Arc::clone(&events), settings, shutdown)
                    .await;

            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
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
            join_bounded(task, self.config.timeouts.stop, "tcp client").await;
        }
        self.peer.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl ClientAdapter for TcpClientAdapter {
    fn send_burst(&self, count: usize, payload: &Payload) -> Result<usize, TransportError> {
        let peer = self.current_peer().ok_or(TransportError::NotConnected)?;
        for _ in 0..count {
            peer.send(payload)?;
        }
        Ok(count)
    }
}

impl Drop for TcpClientAdapter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server side: a listener plus one task per accepted connection.
pub struct TcpServerAdapter {
    config: Arc<BenchmarkConfiguration>,
    /// Stops the accept loop.
    stop: watch::Sender<bool>,
    /// Closes accepted connections.
    close_peers: watch::Sender<bool>,
    active: Arc<watch::Sender<usize>>,
    task: Option<JoinHandle<()>>,
}

impl TcpServerAdapter {
    pub fn new(config: Arc<BenchmarkConfiguration>) -> Self {
        let (stop, _) = watch::channel(false);
        let (close_peers, _) = watch::channel(false);
        let (active, _) = watch::channel(0usize);
        Self {
            config,
            stop,
            close_peers,
            active: Arc::new(active),
            task: None,
        }
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        *self.active.borrow()
    }
}

async fn accept_loop(
    config: Arc<BenchmarkConfiguration>,
    events: Arc<dyn TransportEvents>,
    mut stop: watch::Receiver<bool>,
    close_peers: watch::Receiver<bool>,
    active: Arc<watch::Sender<usize>>,
) {
    let addr = config.socket_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            events.on_error(Some(addr), &TransportError::Bind { addr, source });
            return;
        }
    };
    let local = listener.local_addr().unwrap_or(addr);
    events.on_listening(local);

    let settings = ConnectionSettings::new(&config, config.tick_rate_server);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%remote, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let (tx, rx) = mpsc::unbounded_channel();
                    let peer = Arc::new(TcpPeer { id: next_peer_id(), remote, outbound: tx });
                    active.send_modify(|n| *n += 1);
                    events.on_connected(peer.clone());

                    let events = Arc::clone(&events);
                    let close_peers = close_peers.clone();
                    let active = Arc::clone(&active);
                    connections.spawn(async move {
                        let id = peer.id;
                        let reason =
                            run_connection(stream, peer, rx, Arc::clone(&events), settings, close_peers)
                                .await;
                        active.send_modify(|n| *n = n.saturating_sub(1));
                        events.on_disconnected(id, reason);
                    });
                }
                Err(source) => events.on_error(
                    Some(local),
                    &TransportError::Io { context: "accepting connection", source },
                ),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = stop.wait_for(|stop| *stop) => break,
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

#[async_trait]
impl TransportAdapter for TcpServerAdapter {
    fn start(&mut self, events: Arc<dyn TransportEvents>) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Server already started");
            return;
        }
        self.stop.send_replace(false);
        self.close_peers.send_replace(false);

        self.task = Some(tokio::spawn(accept_loop(
            Arc::clone(&self.config),
            events,
            self.stop.subscribe(),
            self.close_peers.subscribe(),
            Arc::clone(&self.active),
        )));
    }

    async fn disconnect(&mut self) {
        self.close_peers.send_replace(true);
        let mut active = self.active.subscribe();
        let _ = active.wait_for(|n| *n == 0).await;
    }

    async fn stop(&mut self) {
        self.close_peers.send_replace(true);
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            join_bounded(task, self.config.timeouts.stop, "tcp server").await;
        }
    }
}

impl Drop for TcpServerAdapter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
