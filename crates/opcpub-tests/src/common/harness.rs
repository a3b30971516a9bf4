// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Wires a [`MockTransport`], a [`SessionRegistry`] and a running
//! [`ReconciliationLoop`] together.
//!
//! ## Design Principles
//!
//! - Automatic resource management
//! - Deterministic waiting: passes are awaited, never slept on
//! - Parallel test isolation: every harness owns its own mock server

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use opcpub_opcua::{
    AddOutcome, ChannelSink, ConnectionSession, DiscardSink, EngineSettings, MessageData,
    PassReport, PointIdentity, ReconciliationLoop, SessionRegistry,
};

use super::builders::SettingsBuilder;
use super::mocks::MockTransport;

// =============================================================================
// Test Harness
// =============================================================================

/// Configuration for the test harness.
#[derive(Debug, Clone)]
pub struct TestHarnessConfig {
    /// Name of the test (used for logging).
    pub test_name: String,

    /// Timeout for the entire test and for each wait.
    pub timeout: Duration,

    /// Engine settings.
    pub settings: EngineSettings,

    /// Capacity of the telemetry channel.
    pub sink_capacity: usize,

    /// Whether to enable tracing for the test.
    pub enable_tracing: bool,
}

impl Default for TestHarnessConfig {
    fn default() -> Self {
        Self {
            test_name: "unknown_test".to_string(),
            timeout: Duration::from_secs(10),
            settings: SettingsBuilder::new().build(),
            sink_capacity: 1024,
            enable_tracing: false,
        }
    }
}

impl TestHarnessConfig {
    /// Create a new config with a test name.
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the engine settings.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enable tracing.
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }
}

/// A running engine over a mock server.
pub struct TestHarness {
    config: TestHarnessConfig,

    /// The mock server.
    pub transport: MockTransport,

    /// The registry under test.
    pub registry: SessionRegistry,

    /// The reconciliation loop driving the registry.
    pub engine: ReconciliationLoop,

    /// Cancellation token of the loop.
    pub cancel: CancellationToken,

    sink: Arc<ChannelSink>,
    records: mpsc::Receiver<MessageData>,
}

impl TestHarness {
    /// Starts a harness. Must be called inside a tokio runtime.
    pub fn start(config: TestHarnessConfig) -> Self {
        if config.enable_tracing {
            super::init_test_logging();
        }

        let transport = MockTransport::new();
        let settings = Arc::new(config.settings.clone());
        let (sink, records) = ChannelSink::new(config.sink_capacity);
        let sink = Arc::new(sink);

        let registry = SessionRegistry::new(
            Arc::new(transport.clone()),
            Arc::clone(&settings),
            sink.clone(),
        );
        let cancel = CancellationToken::new();
        let engine = ReconciliationLoop::start(registry.clone(), settings, cancel.clone());

        tracing::debug!(test = %config.test_name, "Test harness started");

        Self {
            config,
            transport,
            registry,
            engine,
            cancel,
            sink,
            records,
        }
    }

    /// Starts a harness with default settings.
    pub fn with_name(test_name: impl Into<String>) -> Self {
        Self::start(TestHarnessConfig::new(test_name))
    }

    /// Starts a harness with the given settings.
    pub fn with_settings(test_name: impl Into<String>, settings: EngineSettings) -> Self {
        Self::start(TestHarnessConfig::new(test_name).settings(settings))
    }

    /// Requests monitoring of `identity` on `endpoint`.
    pub async fn add(
        &self,
        endpoint: &str,
        identity: PointIdentity,
        publishing_interval: Option<Duration>,
        sampling_interval: Option<Duration>,
    ) -> AddOutcome {
        self.registry
            .add_point_for_monitoring(endpoint, identity, publishing_interval, sampling_interval)
            .await
    }

    /// Requests removal of `identity` on `endpoint`.
    pub async fn remove(&self, endpoint: &str, identity: &PointIdentity) -> bool {
        self.registry.request_point_removal(endpoint, identity).await
    }

    /// Waits until every scheduled pass has finished.
    pub async fn settle(&self) {
        if tokio::time::timeout(self.config.timeout, self.engine.wait_idle())
            .await
            .is_err()
        {
            panic!(
                "[{}] passes did not settle within {:?}",
                self.config.test_name, self.config.timeout
            );
        }
    }

    /// Runs one pass over every session inline.
    pub async fn pass(&self) -> Vec<PassReport> {
        self.engine.reconcile_now().await
    }

    /// Returns the session for `endpoint`, panicking if none exists.
    pub async fn session(&self, endpoint: &str) -> Arc<ConnectionSession> {
        match self.registry.find_session(endpoint).await {
            Some(session) => session,
            None => panic!("[{}] no session for {}", self.config.test_name, endpoint),
        }
    }

    /// Receives the next telemetry record.
    pub async fn next_record(&mut self) -> MessageData {
        match tokio::time::timeout(self.config.timeout, self.records.recv()).await {
            Ok(Some(record)) => record,
            Ok(None) => panic!("[{}] telemetry channel closed", self.config.test_name),
            Err(_) => panic!("[{}] no telemetry record received", self.config.test_name),
        }
    }

    /// Drains the records received so far.
    pub fn drain_records(&mut self) -> Vec<MessageData> {
        let mut records = Vec::new();
        while let Ok(record) = self.records.try_recv() {
            records.push(record);
        }
        records
    }

    /// Number of records dropped by the sink.
    pub fn dropped_records(&self) -> u64 {
        self.sink.dropped()
    }

    /// Stops the loop and shuts every session down.
    pub async fn shutdown(self) {
        self.engine.shutdown().await;
    }
}

/// A registry over `transport` with no loop attached.
///
/// Requests only queue work; tests drive passes through
/// [`ConnectionSession::reconcile`].
pub fn detached_registry(transport: &MockTransport, settings: EngineSettings) -> SessionRegistry {
    SessionRegistry::new(
        Arc::new(transport.clone()),
        Arc::new(settings),
        Arc::new(DiscardSink),
    )
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("test_name", &self.config.test_name)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
