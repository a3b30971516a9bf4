// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The reconciliation loop.
//!
//! Passes are triggered by a fixed-period ticker and by add/remove requests
//! on the registry. Every pass runs as its own task, bounded by a semaphore,
//! and is counted in a watch channel so callers can wait for quiescence.
//!
//! ```text
//!  ticker ──┐
//!           ├──▶ submit ──▶ [permit] ──▶ session.reconcile ──▶ prune_empty_sessions
//! registry ─┘                                   │
//!                                               └──▶ ConfigurationChanged (broadcast)
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{ConnectionSession, PassReport};
use crate::registry::SessionRegistry;
use crate::settings::EngineSettings;

/// Capacity of the configuration-changed channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Requests and events
// =============================================================================

/// Work submitted to the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileRequest {
    /// Reconcile every session.
    All,
    /// Reconcile the session for one endpoint.
    Session(String),
}

/// Emitted after a pass that added or removed points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationChanged {
    /// Endpoint whose desired state changed.
    pub endpoint: String,
}

/// Accepts reconciliation requests.
pub trait ReconcileScheduler: Send + Sync {
    /// Schedules a request without waiting for it.
    fn schedule(&self, request: ReconcileRequest);
}

// =============================================================================
// ReconciliationLoop
// =============================================================================

struct LoopInner {
    me: Weak<LoopInner>,
    registry: SessionRegistry,
    settings: Arc<EngineSettings>,
    permits: Arc<Semaphore>,
    in_flight: watch::Sender<usize>,
    changes: broadcast::Sender<ConfigurationChanged>,
    cancel: CancellationToken,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Drives reconciliation passes for a registry.
#[derive(Clone)]
pub struct ReconciliationLoop {
    inner: Arc<LoopInner>,
}

impl ReconciliationLoop {
    /// Attaches a loop to `registry` and starts the periodic ticker.
    pub fn start(
        registry: SessionRegistry,
        settings: Arc<EngineSettings>,
        cancel: CancellationToken,
    ) -> Self {
        let permits = settings.max_concurrent_passes.max(1);
        let (in_flight, _) = watch::channel(0usize);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let inner = Arc::new_cyclic(|me| LoopInner {
            me: me.clone(),
            registry,
            settings,
            permits: Arc::new(Semaphore::new(permits)),
            in_flight,
            changes,
            cancel,
            ticker: parking_lot::Mutex::new(None),
        });

        let weak: Weak<LoopInner> = Arc::downgrade(&inner);
        let scheduler: Weak<dyn ReconcileScheduler> = weak;
        inner.registry.set_scheduler(scheduler);

        let ticker = tokio::spawn(run_ticker(Arc::downgrade(&inner), inner.cancel.clone()));
        *inner.ticker.lock() = Some(ticker);

        tracing::info!(
            interval_ms = inner.settings.reconcile_interval.as_millis() as u64,
            max_concurrent_passes = permits,
            "Reconciliation loop started"
        );

        Self { inner }
    }

    /// Registry driven by this loop.
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Submits a request; the pass runs on its own task.
    pub fn submit(&self, request: ReconcileRequest) {
        self.inner.submit(request);
    }

    /// Number of passes submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Waits until every submitted pass has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Receiver for configuration-changed events.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.inner.changes.subscribe()
    }

    /// Runs one pass over every session inline.
    pub async fn reconcile_now(&self) -> Vec<PassReport> {
        let mut reports = Vec::new();
        for session in self.inner.registry.sessions().await {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            reports.push(self.inner.reconcile_session(&session).await);
        }
        reports
    }

    /// Runs one pass over `session` inline.
    pub async fn reconcile_session(&self, session: &ConnectionSession) -> PassReport {
        self.inner.reconcile_session(session).await
    }

    /// Stops the loop, waits for running passes and shuts every session down.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let ticker = self.inner.ticker.lock().take();
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }
        self.wait_idle().await;
        self.inner.registry.shutdown().await;
        tracing::info!("Reconciliation loop stopped");
    }
}

impl std::fmt::Debug for ReconciliationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationLoop")
            .field("in_flight", &self.in_flight())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl LoopInner {
    fn submit(&self, request: ReconcileRequest) {
        if self.cancel.is_cancelled() {
            tracing::debug!(?request, "Loop cancelled, request dropped");
            return;
        }
        let Some(this) = self.me.upgrade() else {
            return;
        };

        // Counted before spawning so wait_idle never misses the pass.
        self.in_flight.send_modify(|n| *n += 1);
        let guard = PassGuard(Arc::clone(&this));

        tokio::spawn(async move {
            let _guard = guard;
            match request {
                ReconcileRequest::All => {
                    for session in this.registry.sessions().await {
                        this.submit(ReconcileRequest::Session(session.endpoint().to_string()));
                    }
                }
                ReconcileRequest::Session(endpoint) => {
                    let Ok(_permit) = Arc::clone(&this.permits).acquire_owned().await else {
                        return;
                    };
                    if this.cancel.is_cancelled() {
                        return;
                    }
                    if let Some(session) = this.registry.find_session(&endpoint).await {
                        this.reconcile_session(&session).await;
                    }
                }
            }
        });
    }

    async fn reconcile_session(&self, session: &ConnectionSession) -> PassReport {
        let report = session.reconcile(&self.cancel).await;
        tracing::debug!(
            endpoint = %session.endpoint(),
            connected = report.connected,
            added = report.added,
            removed = report.removed,
            groups_pruned = report.groups_pruned,
            "Reconciliation pass finished"
        );

        self.registry.prune_empty_sessions().await;

        if report.changed() && self.settings.update_configuration {
            // No subscribers is fine.
            let _ = self.changes.send(ConfigurationChanged {
                endpoint: session.endpoint().to_string(),
            });
        }
        report
    }
}

impl ReconcileScheduler for LoopInner {
    fn schedule(&self, request: ReconcileRequest) {
        self.submit(request);
    }
}

/// Decrements the in-flight count when a pass task ends.
struct PassGuard(Arc<LoopInner>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

async fn run_ticker(inner: Weak<LoopInner>, cancel: CancellationToken) {
    let period = match inner.upgrade() {
        Some(inner) => inner.settings.reconcile_interval,
        None => return,
    };
    // Requests schedule their own passes; the first tick waits a full period.
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.submit(ReconcileRequest::All);
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Reconciliation ticker shutting down");
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EndpointDescription, OpcUaTransport, RemoteSession, SessionRequest};
    use crate::error::{ConnectionError, OpcUaResult};
    use crate::telemetry::DiscardSink;
    use crate::types::NodeId;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl OpcUaTransport for Unreachable {
        async fn select_endpoint(&self, url: &str, _: bool) -> OpcUaResult<EndpointDescription> {
            Err(ConnectionError::unreachable(url, "offline").into())
        }

        async fn create_session(
            &self,
            endpoint: &EndpointDescription,
            _: SessionRequest,
        ) -> OpcUaResult<Arc<dyn RemoteSession>> {
            Err(ConnectionError::unreachable(&endpoint.url, "offline").into())
        }
    }

    fn start() -> ReconciliationLoop {
        let settings = Arc::new(EngineSettings {
            reconcile_interval: Duration::from_secs(3600),
            ..EngineSettings::default()
        });
        let registry = SessionRegistry::new(
            Arc::new(Unreachable),
            Arc::clone(&settings),
            Arc::new(DiscardSink),
        );
        ReconciliationLoop::start(registry, settings, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_add_schedules_pass() {
        let engine = start();
        engine
            .registry()
            .add_point_for_monitoring("opc.tcp://plc:4840", NodeId::numeric(2, 1).into(), None, None)
            .await;
        engine.wait_idle().await;

        let session = engine
            .registry()
            .find_session("opc.tcp://plc:4840")
            .await
            .unwrap();
        assert!(session.stats().connect_attempts() >= 1);
        assert!(session.stats().connect_failures() >= 1);
        assert_eq!(engine.in_flight(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drops_requests() {
        let engine = start();
        engine.shutdown().await;
        engine.submit(ReconcileRequest::All);
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(engine.registry().session_count().await, 0);
    }
}
