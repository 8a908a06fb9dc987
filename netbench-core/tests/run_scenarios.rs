// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end runs of the coordinator over the bundled transports and over
//! adapters that misbehave on purpose.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netbench_core::transport::LoopbackTransport;
use netbench_core::{
    BenchmarkConfiguration, BenchmarkCoordinator, BenchmarkMode, BenchmarkPhase, ClientAdapter,
    ClientId, ConfigLoader, DisconnectReason, FailureKind, Payload, PeerId, RawBenchmarkConfig,
    Transport, TransportAdapter, TransportError, TransportEvents, TransportKind,
};
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

fn loopback_config(clients: usize, parallel: usize, size: usize, target: u64) -> BenchmarkConfiguration {
    BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Loopback,
        clients,
        parallel_messages: parallel,
        message_byte_size: size,
        message_target: target,
        max_duration_ms: 30_000,
        ..RawBenchmarkConfig::default()
    })
    .expect("valid config")
}

fn free_tcp_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

// ============================================================================
// Misbehaving adapters
// ============================================================================

/// Adapter that accepts every command and never fires an event.
struct SilentAdapter;

#[async_trait]
impl TransportAdapter for SilentAdapter {
    fn start(&mut self, _events: Arc<dyn TransportEvents>) {}
    async fn disconnect(&mut self) {}
    async fn stop(&mut self) {}
}

impl ClientAdapter for SilentAdapter {
    fn send_burst(&self, _count: usize, _payload: &Payload) -> Result<usize, TransportError> {
        Err(TransportError::NotConnected)
    }
}

/// Loopback transport whose server and/or clients never come up.
struct SilentTransport {
    inner: LoopbackTransport,
    server_listens: bool,
}

impl Transport for SilentTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }

    fn create_server(&self, config: &Arc<BenchmarkConfiguration>) -> Box<dyn TransportAdapter> {
        if self.server_listens {
            self.inner.create_server(config)
        } else {
            Box::new(SilentAdapter)
        }
    }

    fn create_client(
        &self,
        _id: ClientId,
        _config: &Arc<BenchmarkConfiguration>,
    ) -> Box<dyn ClientAdapter> {
        Box::new(SilentAdapter)
    }
}

/// Wraps a client adapter and reports an inactivity timeout right after the
/// initial burst.
struct TimeoutAfterBurst {
    inner: Box<dyn ClientAdapter>,
    events: Option<Arc<dyn TransportEvents>>,
}

#[async_trait]
impl TransportAdapter for TimeoutAfterBurst {
    fn start(&mut self, events: Arc<dyn TransportEvents>) {
        self.events = Some(Arc::clone(&events));
        self.inner.start(events);
    }

    async fn disconnect(&mut self) {
        self.inner.disconnect().await;
    }

    async fn stop(&mut self) {
        self.inner.stop().await;
    }
}

impl ClientAdapter for TimeoutAfterBurst {
    fn send_burst(&self, count: usize, payload: &Payload) -> Result<usize, TransportError> {
        let sent = self.inner.send_burst(count, payload)?;
        if let Some(events) = &self.events {
            events.on_disconnected(PeerId::new(u64::MAX), DisconnectReason::Timeout);
        }
        Ok(sent)
    }
}

struct FlakyTransport {
    inner: LoopbackTransport,
    flaky_clients: usize,
}

impl Transport for FlakyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }

    fn create_server(&self, config: &Arc<BenchmarkConfiguration>) -> Box<dyn TransportAdapter> {
        self.inner.create_server(config)
    }

    fn create_client(
        &self,
        id: ClientId,
        config: &Arc<BenchmarkConfiguration>,
    ) -> Box<dyn ClientAdapter> {
        let inner = self.inner.create_client(id, config);
        if id.index() < self.flaky_clients {
            Box::new(TimeoutAfterBurst {
                inner,
                events: None,
            })
        } else {
            inner
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_garbage_workload_reaches_target() {
    init_tracing();
    let config = loopback_config(10, 10, 128, 10_000);
    let mut coordinator = BenchmarkCoordinator::from_config(config);

    let report = coordinator.run().await.expect("run succeeds");
    let snapshot = report.snapshot;

    assert!(snapshot.messages_client_sent >= 10_000);
    assert!(snapshot.messages_client_received >= 10_000);
    assert!(snapshot.messages_client_received <= snapshot.messages_client_sent);
    assert!(snapshot.messages_server_received >= snapshot.messages_client_received);
    assert_eq!(snapshot.errors, 0);
    assert_eq!(report.burst_messages, 100);
    assert!(report.teardown.is_clean());
    assert_eq!(coordinator.phase(), BenchmarkPhase::Stopped);

    let phases: Vec<_> = report.timeline.iter().map(|t| t.phase).collect();
    assert_eq!(
        phases,
        vec![
            BenchmarkPhase::Idle,
            BenchmarkPhase::Configuring,
            BenchmarkPhase::Connecting,
            BenchmarkPhase::Warming,
            BenchmarkPhase::Measuring,
            BenchmarkPhase::Draining,
            BenchmarkPhase::Stopped,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counters_frozen_after_stop() {
    init_tracing();
    let mut coordinator = BenchmarkCoordinator::from_config(loopback_config(4, 8, 32, 5_000));
    let report = coordinator.run().await.expect("run succeeds");

    let counters = Arc::clone(coordinator.counters().expect("counters"));
    assert!(!counters.is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counters.snapshot(), report.snapshot);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeouts_during_run_are_counted_once() {
    init_tracing();
    let transport = Arc::new(FlakyTransport {
        inner: LoopbackTransport::new(),
        flaky_clients: 3,
    });
    let mut coordinator =
        BenchmarkCoordinator::new(loopback_config(10, 10, 64, 10_000), transport);

    let report = coordinator.run().await.expect("timeouts do not abort the run");
    assert_eq!(report.snapshot.errors, 3);
    assert!(report.snapshot.messages_client_received >= 10_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_never_listening_is_setup_failure() {
    init_tracing();
    let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Loopback,
        clients: 5,
        connect_timeout_ms: 200,
        ..RawBenchmarkConfig::default()
    })
    .unwrap();
    let transport = Arc::new(SilentTransport {
        inner: LoopbackTransport::new(),
        server_listens: false,
    });
    let mut coordinator = BenchmarkCoordinator::new(config, transport);

    let err = coordinator.run().await.expect_err("setup must fail");
    let failure = err.run_failure().expect("run failure");
    assert_eq!(failure.phase, BenchmarkPhase::Connecting);
    assert_eq!(
        failure.kind,
        FailureKind::SetupFailure {
            connected: 0,
            expected: 5,
            server_listening: false,
        }
    );
    assert!(failure.snapshot.is_empty());
    assert_eq!(coordinator.phase(), BenchmarkPhase::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clients_never_connecting_is_setup_failure() {
    init_tracing();
    let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Loopback,
        clients: 3,
        connect_timeout_ms: 200,
        ..RawBenchmarkConfig::default()
    })
    .unwrap();
    let transport = Arc::new(SilentTransport {
        inner: LoopbackTransport::new(),
        server_listens: true,
    });
    let inner_hub = Arc::clone(transport.inner.hub());
    let mut coordinator = BenchmarkCoordinator::new(config, transport);

    let err = coordinator.run().await.expect_err("setup must fail");
    let failure = err.run_failure().expect("run failure");
    assert!(matches!(
        failure.kind,
        FailureKind::SetupFailure {
            connected: 0,
            expected: 3,
            server_listening: true,
        }
    ));
    // The server was torn down even though setup failed
    assert!(!inner_hub.is_listening(3333));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_client_single_message() {
    init_tracing();
    let mut coordinator = BenchmarkCoordinator::from_config(loopback_config(1, 1, 32, 1_000));
    let report = coordinator.run().await.expect("run succeeds");

    assert!(report.snapshot.messages_client_sent >= 1_000);
    assert!(report.snapshot.messages_client_received >= 1_000);
    assert_eq!(report.burst_messages, 1);
    assert_eq!(report.snapshot.errors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_target_expires() {
    init_tracing();
    let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Loopback,
        clients: 2,
        parallel_messages: 2,
        message_target: u64::MAX,
        max_duration_ms: 150,
        ..RawBenchmarkConfig::default()
    })
    .unwrap();
    let mut coordinator = BenchmarkCoordinator::from_config(config);

    let err = coordinator.run().await.expect_err("target unreachable");
    let failure = err.run_failure().expect("run failure");
    assert_eq!(failure.phase, BenchmarkPhase::Measuring);
    assert!(matches!(
        failure.kind,
        FailureKind::TargetNotReached { limit_ms: 150, .. }
    ));
    assert!(failure.snapshot.messages_client_received > 0);
    assert!(failure.elapsed >= Duration::from_millis(150));
    assert_eq!(coordinator.phase(), BenchmarkPhase::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tcp_echo_on_localhost() {
    init_tracing();
    let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Tcp,
        port: free_tcp_port(),
        clients: 4,
        parallel_messages: 4,
        message_byte_size: 64,
        message_target: 2_000,
        verify_echo: true,
        max_duration_ms: 30_000,
        ..RawBenchmarkConfig::default()
    })
    .unwrap();
    let mut coordinator = BenchmarkCoordinator::from_config(config);

    let report = coordinator.run().await.expect("tcp run succeeds");
    assert!(report.snapshot.messages_client_received >= 2_000);
    assert_eq!(report.snapshot.errors, 0);
    assert!(report.messages_per_sec() > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_from_config_file() {
    init_tracing();
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "transport: loopback\nmode: garbage\nclients: 2\nparallel_messages: 2\nmessage_target: 500"
    )
    .unwrap();

    let config = ConfigLoader::load_file(file.path()).expect("config loads");
    assert_eq!(config.mode, BenchmarkMode::Garbage);

    let mut coordinator = BenchmarkCoordinator::from_config(config);
    let report = coordinator.run().await.expect("run succeeds");
    assert_eq!(report.mode, BenchmarkMode::Garbage);
    assert!(report.snapshot.messages_client_received >= 500);
}

#[tokio::test]
async fn test_coordinator_is_single_use() {
    let mut coordinator = BenchmarkCoordinator::from_config(loopback_config(1, 1, 8, 10));
    coordinator.run().await.expect("first run succeeds");
    assert!(coordinator.run().await.is_err());
}
