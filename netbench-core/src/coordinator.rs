// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark coordinator: runs one benchmark from configuration to snapshot.
//!
//! The control flow is linear and phase-tracked:
//!
//! 1. Configuring: fresh counters, the shared payload, server and clients.
//! 2. Connecting: start the server, wait for it to listen, start every
//!    client, wait for every connection. Bounded by the connect timeout.
//! 3. Warming: set running, inject each client's initial burst.
//! 4. Measuring: sample the client receive counter until it reaches the
//!    target or the run exceeds its maximum duration.
//! 5. Draining: clear running, disconnect and stop every client, stop the
//!    server. Each operation bounded.
//! 6. Stopped: snapshot the counters.
//!
//! A failure during connecting still tears everything down before the
//! coordinator reports it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::ClientPool;
use crate::config::BenchmarkConfiguration;
use crate::counters::BenchmarkData;
use crate::error::{FailureKind, NetBenchResult, RunFailure};
use crate::payload::Payload;
use crate::report::RunReport;
use crate::server::EchoServer;
use crate::state::{BenchmarkPhase, PhaseMachine};
use crate::teardown::TeardownSummary;
use crate::transport::{transport_for, Transport};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Extra time the coordinator allows beyond an adapter's own stop bound.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Instances built for one run.
struct RunContext {
    data: Arc<BenchmarkData>,
    server: EchoServer,
    pool: ClientPool,
}

enum Measurement {
    Reached { elapsed: Duration },
    Expired { elapsed: Duration, received: u64 },
}

/// Drives a single benchmark run. Not reusable: create one per run.
pub struct BenchmarkCoordinator {
    config: Arc<BenchmarkConfiguration>,
    transport: Arc<dyn Transport>,
    phases: PhaseMachine,
    data: Option<Arc<BenchmarkData>>,
}

impl BenchmarkCoordinator {
    pub fn new(config: BenchmarkConfiguration, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            phases: PhaseMachine::new(),
            data: None,
        }
    }

    /// Coordinator using the transport named by the configuration.
    pub fn from_config(config: BenchmarkConfiguration) -> Self {
        let transport = transport_for(config.transport);
        Self::new(config, transport)
    }

    pub fn config(&self) -> &BenchmarkConfiguration {
        &self.config
    }

    pub fn phase(&self) -> BenchmarkPhase {
        self.phases.phase()
    }

    pub fn phases(&self) -> &PhaseMachine {
        &self.phases
    }

    /// Live counters of the current or last run.
    pub fn counters(&self) -> Option<&Arc<BenchmarkData>> {
        self.data.as_ref()
    }

    /// Execute the run.
    ///
    /// Returns the report on success, or [`crate::NetBenchError::RunFailed`]
    /// carrying the failed phase and the counters at the time of failure.
    pub async fn run(&mut self) -> NetBenchResult<RunReport> {
        self.phases.transition_to(BenchmarkPhase::Configuring)?;
        let run = self.configure();

        self.phases.transition_to(BenchmarkPhase::Connecting)?;
        let started = Instant::now();
        if let Err(kind) = self.connect(&run).await {
            error!(%kind, "Setup failed, tearing down");
            self.teardown(&run).await;
            let snapshot = run.data.snapshot();
            self.phases.transition_to(BenchmarkPhase::Stopped)?;
            return Err(RunFailure {
                phase: BenchmarkPhase::Connecting,
                kind,
                snapshot,
                elapsed: started.elapsed(),
            }
            .into());
        }
        info!(
            clients = run.pool.len(),
            connect_ms = started.elapsed().as_millis() as u64,
            "All clients connected"
        );

        self.phases.transition_to(BenchmarkPhase::Warming)?;
        run.data.set_running(true);
        let warm_start = Instant::now();
        let burst_messages = run.pool.start_sending_all().await;

        self.phases.transition_to(BenchmarkPhase::Measuring)?;
        let measurement = self.measure(&run.data, warm_start).await;

        self.phases.transition_to(BenchmarkPhase::Draining)?;
        run.data.set_running(false);
        let teardown = self.teardown(&run).await;

        let snapshot = run.data.snapshot();
        self.phases.transition_to(BenchmarkPhase::Stopped)?;

        match measurement {
            Measurement::Reached { elapsed } => {
                info!(
                    received = snapshot.messages_client_received,
                    sent = snapshot.messages_client_sent,
                    errors = snapshot.errors,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Benchmark completed"
                );
                Ok(RunReport::new(
                    &self.config,
                    snapshot,
                    elapsed,
                    burst_messages,
                    teardown,
                    self.phases.timeline().to_vec(),
                ))
            }
            Measurement::Expired { elapsed, received } => {
                let limit = self.config.timeouts.max_duration;
                warn!(
                    received,
                    target = self.config.message_target,
                    limit_ms = limit.as_millis() as u64,
                    "Message target not reached"
                );
                Err(RunFailure {
                    phase: BenchmarkPhase::Measuring,
                    kind: FailureKind::TargetNotReached {
                        received,
                        target: self.config.message_target,
                        limit_ms: limit.as_millis() as u64,
                    },
                    snapshot,
                    elapsed,
                }
                .into())
            }
        }
    }

    fn configure(&mut self) -> RunContext {
        let data = BenchmarkData::new_shared();
        let payload = Payload::generate(self.config.message_size);
        let transport = self.transport.as_ref();

        let server = EchoServer::new(transport, &self.config, &data, &payload);
        let pool = ClientPool::new(transport, &self.config, &data, &payload);
        self.data = Some(Arc::clone(&data));

        debug!(
            transport = %self.transport.kind(),
            clients = self.config.clients,
            parallel = self.config.parallel_messages,
            message_bytes = payload.len(),
            target = self.config.message_target,
            "Run configured"
        );
        RunContext { data, server, pool }
    }

    async fn connect(&self, run: &RunContext) -> Result<(), FailureKind> {
        let deadline = Instant::now() + self.config.timeouts.connect;
        let expected = run.pool.len();

        run.server.start().await;
        let Some(addr) = run
            .server
            .wait_until_listening(self.config.timeouts.connect)
            .await
        else {
            return Err(FailureKind::SetupFailure {
                connected: 0,
                expected,
                server_listening: false,
            });
        };
        debug!(%addr, "Server ready, starting clients");

        run.pool.start_all().await;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !run.pool.wait_until_all_connected(remaining).await {
            return Err(FailureKind::SetupFailure {
                connected: run.pool.connected_count(),
                expected,
                server_listening: true,
            });
        }
        Ok(())
    }

    async fn measure(&self, data: &BenchmarkData, warm_start: Instant) -> Measurement {
        let target = self.config.message_target;
        let limit = self.config.timeouts.max_duration;

        let mut ticker = tokio::time::interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_progress = PROGRESS_LOG_INTERVAL;

        loop {
            ticker.tick().await;
            let received = data.client_received();
            let elapsed = warm_start.elapsed();

            if received >= target {
                return Measurement::Reached { elapsed };
            }
            if elapsed >= limit {
                return Measurement::Expired { elapsed, received };
            }
            if elapsed >= next_progress {
                debug!(
                    received,
                    target,
                    errors = data.errors(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Measuring"
                );
                next_progress += PROGRESS_LOG_INTERVAL;
            }
        }
    }

    async fn teardown(&self, run: &RunContext) -> TeardownSummary {
        let timeouts = &self.config.timeouts;
        let stop_bound = timeouts.stop + STOP_GRACE;

        let mut summary = run.pool.disconnect_all(timeouts.disconnect).await;
        summary.merge(run.pool.stop_all(stop_bound).await);
        summary.record(run.server.stop(stop_bound).await);

        if summary.is_clean() {
            debug!(?summary, "Teardown complete");
        } else {
            warn!(
                timed_out = summary.timed_out,
                failed = summary.failed,
                "Teardown finished with overruns"
            );
        }
        summary
    }
}
