// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Echo, disconnect and error policies shared by clients and the server.
//!
//! While the run is active every received message is counted and answered
//! with exactly one send of the shared payload, which keeps each client's
//! in-flight window constant. Once the running flag clears, messages are
//! dropped without being counted or echoed.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::counters::{BenchmarkData, Role};
use crate::error::TransportError;
use crate::payload::Payload;
use crate::transport::{DisconnectReason, PeerLink};
use crate::types::PeerId;

/// What happened to one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// Counted and answered.
    Echoed,
    /// Counted, but the answer could not be queued.
    SendFailed,
    /// Run not active; nothing counted.
    Dropped,
}

/// Per-instance policy state: role, shared counters and the shared payload.
#[derive(Debug, Clone)]
pub struct EchoPolicy {
    role: Role,
    data: Arc<BenchmarkData>,
    payload: Payload,
    verify: bool,
}

impl EchoPolicy {
    pub fn new(role: Role, data: Arc<BenchmarkData>, payload: Payload, verify: bool) -> Self {
        Self {
            role,
            data,
            payload,
            verify,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn data(&self) -> &Arc<BenchmarkData> {
        &self.data
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Handle one received message. Callers log [`EchoOutcome::SendFailed`]
    /// with their own context.
    pub fn on_message(&self, peer: &dyn PeerLink, bytes: &[u8]) -> EchoOutcome {
        if !self.data.is_running() {
            return EchoOutcome::Dropped;
        }

        self.data.record_received(self.role);

        if self.verify {
            if let Err(e) = self.payload.verify_echo(bytes) {
                warn!(role = %self.role, peer = %peer.id(), error = %e, "Corrupted echo");
                self.data.record_error();
            }
        }

        match peer.send(&self.payload) {
            Ok(()) => {
                self.data.record_sent(self.role, 1);
                EchoOutcome::Echoed
            }
            // The disconnect event for this peer accounts for the failure.
            Err(_) => EchoOutcome::SendFailed,
        }
    }

    /// Count an inactivity timeout during the active run as an error.
    ///
    /// Returns whether the error counter was incremented.
    pub fn on_disconnected(&self, peer: PeerId, reason: DisconnectReason) -> bool {
        if reason == DisconnectReason::Timeout && self.data.is_running() {
            self.data.record_error();
            warn!(role = %self.role, %peer, "Connection timed out during run");
            return true;
        }
        debug!(role = %self.role, %peer, ?reason, "Disconnected");
        false
    }

    /// Count a transport error during the active run.
    ///
    /// Returns whether the error counter was incremented.
    pub fn on_error(&self, endpoint: Option<SocketAddr>, error: &TransportError) -> bool {
        if !self.data.is_running() {
            debug!(role = %self.role, ?endpoint, %error, "Transport error outside run");
            return false;
        }
        self.data.record_error();
        warn!(role = %self.role, ?endpoint, %error, "Transport error");
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::MessageSize;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Peer that records sends, or rejects them when closed.
    pub(crate) struct RecordingPeer {
        pub sends: AtomicU64,
        pub closed: bool,
    }

    impl RecordingPeer {
        pub fn new(closed: bool) -> Self {
            Self {
                sends: AtomicU64::new(0),
                closed,
            }
        }
    }

    impl PeerLink for RecordingPeer {
        fn id(&self) -> PeerId {
            PeerId::new(7)
        }

        fn remote_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn send(&self, _payload: &Payload) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::QueueClosed);
            }
            self.sends.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn policy(role: Role, verify: bool) -> EchoPolicy {
        let payload = Payload::generate(MessageSize::new(32).unwrap());
        EchoPolicy::new(role, BenchmarkData::new_shared(), payload, verify)
    }

    #[test]
    fn test_echo_exactly_once_while_running() {
        let policy = policy(Role::Server, false);
        policy.data().set_running(true);
        let peer = RecordingPeer::new(false);

        let payload = policy.payload().clone();
        for _ in 0..100 {
            assert_eq!(policy.on_message(&peer, &payload), EchoOutcome::Echoed);
        }

        let snapshot = policy.data().snapshot();
        assert_eq!(snapshot.messages_server_received, 100);
        assert_eq!(snapshot.messages_server_sent, 100);
        assert_eq!(peer.sends.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_concurrent_echo_keeps_counts_equal() {
        let policy = Arc::new(policy(Role::Client, false));
        policy.data().set_running(true);
        let peer = Arc::new(RecordingPeer::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                let peer = Arc::clone(&peer);
                std::thread::spawn(move || {
                    let bytes = policy.payload().clone();
                    for _ in 0..10_000 {
                        policy.on_message(peer.as_ref(), &bytes);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = policy.data().snapshot();
        assert_eq!(snapshot.messages_client_received, 40_000);
        assert_eq!(snapshot.messages_client_sent, 40_000);
    }

    #[test]
    fn test_dropped_after_running_clears() {
        let policy = policy(Role::Client, false);
        let peer = RecordingPeer::new(false);

        assert_eq!(policy.on_message(&peer, b"late"), EchoOutcome::Dropped);
        assert!(policy.data().snapshot().is_empty());
        assert_eq!(peer.sends.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_send_failure_counts_receive_only() {
        let policy = policy(Role::Client, false);
        policy.data().set_running(true);
        let peer = RecordingPeer::new(true);

        assert_eq!(
            policy.on_message(&peer, policy.payload()),
            EchoOutcome::SendFailed
        );
        let snapshot = policy.data().snapshot();
        assert_eq!(snapshot.messages_client_received, 1);
        assert_eq!(snapshot.messages_client_sent, 0);
        assert_eq!(snapshot.errors, 0);
    }

    #[test]
    fn test_verify_counts_corruption() {
        let policy = policy(Role::Client, true);
        policy.data().set_running(true);
        let peer = RecordingPeer::new(false);

        let mut corrupted = policy.payload().to_vec();
        corrupted[0] ^= 0xFF;
        assert_eq!(policy.on_message(&peer, &corrupted), EchoOutcome::Echoed);
        assert_eq!(policy.data().errors(), 1);
    }

    #[test]
    fn test_timeout_counts_only_while_running() {
        let policy = policy(Role::Client, false);
        assert!(!policy.on_disconnected(PeerId::new(1), DisconnectReason::Timeout));

        policy.data().set_running(true);
        assert!(!policy.on_disconnected(PeerId::new(1), DisconnectReason::RemoteClosed));
        assert!(policy.on_disconnected(PeerId::new(1), DisconnectReason::Timeout));
        assert_eq!(policy.data().errors(), 1);
    }

    #[test]
    fn test_error_counts_only_while_running() {
        let policy = policy(Role::Server, false);
        assert!(!policy.on_error(None, &TransportError::NotConnected));
        policy.data().set_running(true);
        assert!(policy.on_error(None, &TransportError::NotConnected));
        assert_eq!(policy.data().errors(), 1);
    }
}
