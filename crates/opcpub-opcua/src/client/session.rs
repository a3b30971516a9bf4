// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection sessions.
//!
//! A [`ConnectionSession`] owns everything the engine knows about one
//! endpoint: connection state, namespace table, point groups and the remote
//! session handle. All of it lives behind one `tokio::sync::Mutex`; each
//! reconciliation sub-step takes the guard on its own.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └────────failure─────────┘                  │
//!      └───────────keep-alive loss / disconnect────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use opcpub_config::TelemetryConfig;

use crate::error::{ConnectionError, FailureClass, OpcUaError, OpcUaResult};
use crate::registry::PublishedNode;
use crate::settings::EngineSettings;
use crate::telemetry::{TelemetryContext, TelemetrySink};
use crate::types::{ExpandedNodeId, NodeId, OpcUaValue, PointIdentity};

use super::item::{MonitoredPoint, PointState};
use super::namespace::NamespaceResolver;
use super::subscription::PointGroups;
use super::transport::{
    DataChangeHandler, DataChangeNotification, KeepAliveEvent, KeepAliveHandler, MonitoredItemHandle,
    MonitoredItemRequest, OpcUaTransport, RemoteSession, RemoteSubscription, SessionRequest,
    WellKnownNode,
};

/// Items activated between two progress log lines.
const PROGRESS_LOG_EVERY: usize = 50;

// =============================================================================
// SessionState
// =============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No remote session.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// The remote session is established.
    Connected,
}

impl SessionState {
    /// Returns `true` if the remote session is established.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of [`ConnectionSession::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new remote session was established.
    Connected,
    /// The session was already connected.
    AlreadyConnected,
    /// Another connect attempt is in flight.
    InProgress,
    /// Cancellation was requested or the session was shut down.
    Cancelled,
    /// The attempt failed and was counted.
    Failed,
}

impl ConnectOutcome {
    /// Returns `true` if the session is connected after the call.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::AlreadyConnected)
    }
}

/// Result of [`ConnectionSession::add_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new point was queued for activation.
    Added,
    /// A live point with the same identity exists.
    AlreadyPublished,
    /// Cancellation was requested before the point was added.
    Cancelled,
    /// The session has been shut down.
    SessionClosed,
}

/// Work done by one reconciliation pass over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Session was connected at the end of the pass.
    pub connected: bool,
    /// Points activated on the server.
    pub added: usize,
    /// Points dropped after a removal request.
    pub removed: usize,
    /// Empty groups torn down.
    pub groups_pruned: usize,
}

impl PassReport {
    /// Returns `true` if the desired state changed.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for a connection session.
#[derive(Debug, Default)]
pub struct SessionStats {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    items_added: AtomicU64,
    items_removed: AtomicU64,
    keep_alive_disconnects: AtomicU64,
}

impl SessionStats {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connect attempt.
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed connect attempt.
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records activated items.
    pub fn record_items_added(&self, count: usize) {
        self.items_added.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records removed items.
    pub fn record_items_removed(&self, count: usize) {
        self.items_removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a disconnect caused by missed keep-alives.
    pub fn record_keep_alive_disconnect(&self) {
        self.keep_alive_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of connect attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of failed connect attempts.
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of activated items.
    pub fn items_added(&self) -> u64 {
        self.items_added.load(Ordering::Relaxed)
    }

    /// Returns the number of removed items.
    pub fn items_removed(&self) -> u64 {
        self.items_removed.load(Ordering::Relaxed)
    }

    /// Returns the number of keep-alive disconnects.
    pub fn keep_alive_disconnects(&self) -> u64 {
        self.keep_alive_disconnects.load(Ordering::Relaxed)
    }
}

// =============================================================================
// ConnectionSession
// =============================================================================

/// Everything guarded by the session lock.
#[derive(Default)]
struct SessionInner {
    state: SessionState,
    remote: Option<Arc<dyn RemoteSession>>,
    groups: PointGroups,
    namespaces: NamespaceResolver,
    unsuccessful_connections: u32,
    missed_keep_alives: u32,
    min_supported_sampling_interval: Option<Duration>,
}

/// One endpoint and the points monitored on it.
pub struct ConnectionSession {
    me: Weak<ConnectionSession>,
    endpoint: String,
    use_security: bool,
    session_timeout: Duration,
    settings: Arc<EngineSettings>,
    telemetry: Arc<TelemetryConfig>,
    transport: Arc<dyn OpcUaTransport>,
    sink: Arc<dyn TelemetrySink>,
    inner: Mutex<SessionInner>,
    stats: SessionStats,
    terminated: AtomicBool,
}

impl ConnectionSession {
    /// Creates a disconnected session.
    pub fn new(
        endpoint: impl Into<String>,
        use_security: bool,
        session_timeout: Duration,
        settings: Arc<EngineSettings>,
        transport: Arc<dyn OpcUaTransport>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Arc<Self> {
        let telemetry = Arc::new(settings.telemetry.clone());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            endpoint: endpoint.into(),
            use_security,
            session_timeout,
            settings,
            telemetry,
            transport,
            sink,
            inner: Mutex::new(SessionInner::default()),
            stats: SessionStats::new(),
            terminated: AtomicBool::new(false),
        })
    }

    /// Endpoint URL of the session.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether secured endpoints are preferred.
    pub fn use_security(&self) -> bool {
        self.use_security
    }

    /// Session timeout requested from the server.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Current connection state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Consecutive failed connect attempts.
    pub async fn unsuccessful_connections(&self) -> u32 {
        self.inner.lock().await.unsuccessful_connections
    }

    /// Consecutive bad keep-alives since the last good one.
    pub async fn missed_keep_alives(&self) -> u32 {
        self.inner.lock().await.missed_keep_alives
    }

    /// Minimum sampling interval advertised by the server.
    pub async fn min_supported_sampling_interval(&self) -> Option<Duration> {
        self.inner.lock().await.min_supported_sampling_interval
    }

    /// Namespace table fetched on the last connect.
    pub async fn namespaces(&self) -> NamespaceResolver {
        self.inner.lock().await.namespaces.clone()
    }

    /// Number of point groups.
    pub async fn subscription_count(&self) -> usize {
        self.inner.lock().await.groups.len()
    }

    /// Number of points active on the server.
    pub async fn monitored_item_count(&self) -> usize {
        self.inner.lock().await.groups.monitored_count()
    }

    /// State of every point matching `identity`.
    pub async fn point_states(&self, identity: &PointIdentity) -> Vec<PointState> {
        let inner = self.inner.lock().await;
        inner
            .groups
            .iter()
            .flat_map(|g| g.points())
            .filter(|p| p.configured_identity() == identity || p.identity() == identity)
            .map(MonitoredPoint::state)
            .collect()
    }

    /// Desired state of the session: every point not tagged for removal.
    pub async fn snapshot_nodes(&self) -> Vec<PublishedNode> {
        let inner = self.inner.lock().await;
        inner
            .groups
            .iter()
            .flat_map(|group| {
                group
                    .points()
                    .iter()
                    .filter(|p| !p.state().is_removal_requested())
                    .map(move |p| PublishedNode {
                        identity: p.configured_identity().clone(),
                        publishing_interval: group.requested_publishing_interval(),
                        sampling_interval: p.settings().sampling_interval,
                    })
            })
            .collect()
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Establishes the remote session if not already connected.
    ///
    /// The guard is released while the transport works so that slow
    /// endpoints do not block readers of this session.
    pub async fn connect(&self, cancel: &CancellationToken) -> ConnectOutcome {
        let failures = {
            let mut inner = self.inner.lock().await;
            if self.is_terminated() || cancel.is_cancelled() {
                return ConnectOutcome::Cancelled;
            }
            match inner.state {
                SessionState::Connected => return ConnectOutcome::AlreadyConnected,
                SessionState::Connecting => return ConnectOutcome::InProgress,
                SessionState::Disconnected => {}
            }
            inner.state = SessionState::Connecting;
            inner.unsuccessful_connections
        };

        self.stats.record_connect_attempt();
        let timeout = self.settings.connect_timeout(self.session_timeout, failures);
        tracing::info!(
            endpoint = %self.endpoint,
            timeout_ms = timeout.as_millis() as u64,
            failures,
            "Connecting to endpoint"
        );

        let established = self.establish(timeout).await;

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Connecting || self.is_terminated() {
            // Shut down while the transport was working.
            if let Ok(remote) = established {
                let _ = remote.close().await;
            }
            return ConnectOutcome::Cancelled;
        }

        let result = match established {
            Ok(remote) => self.commit_connection(&mut inner, remote).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => ConnectOutcome::Connected,
            Err(e) => {
                inner.unsuccessful_connections = inner.unsuccessful_connections.saturating_add(1);
                inner.state = SessionState::Disconnected;
                inner.remote = None;
                self.stats.record_connect_failure();
                tracing::warn!(
                    endpoint = %self.endpoint,
                    failures = inner.unsuccessful_connections,
                    error = %e,
                    "Connect failed, retrying on next pass"
                );
                ConnectOutcome::Failed
            }
        }
    }

    /// Selects the endpoint and creates the remote session.
    async fn establish(&self, timeout: Duration) -> OpcUaResult<Arc<dyn RemoteSession>> {
        let attempt = async {
            let endpoint = self
                .transport
                .select_endpoint(&self.endpoint, self.use_security)
                .await?;
            tracing::debug!(
                endpoint = %endpoint.url,
                secured = endpoint.secured,
                policy = %endpoint.security_policy_uri,
                "Selected endpoint"
            );
            let request = SessionRequest {
                application_name: self.settings.application_name.clone(),
                session_name: format!("{} {}", self.settings.application_name, Uuid::new_v4()),
                timeout,
            };
            self.transport.create_session(&endpoint, request).await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::timed_out(&self.endpoint, timeout).into()),
        }
    }

    /// Reads the server tables and marks the session connected.
    async fn commit_connection(
        &self,
        inner: &mut SessionInner,
        remote: Arc<dyn RemoteSession>,
    ) -> OpcUaResult<()> {
        let table = remote
            .read_value(&WellKnownNode::NamespaceArray.node_id())
            .await
            .and_then(namespace_uris);
        let uris = match table {
            Ok(uris) => uris,
            Err(e) => {
                let _ = remote.close().await;
                return Err(e);
            }
        };
        inner.namespaces.update(uris);

        match remote
            .read_value(&WellKnownNode::MinSupportedSampleRate.node_id())
            .await
        {
            Ok(value) => {
                inner.min_supported_sampling_interval = value
                    .as_f64()
                    .filter(|ms| ms.is_finite() && *ms >= 0.0)
                    .map(|ms| Duration::from_secs_f64(ms / 1000.0));
            }
            Err(e) => tracing::warn!(
                endpoint = %self.endpoint,
                error = %e,
                "Could not read the minimum supported sampling interval"
            ),
        }

        self.install_keep_alive(&remote);

        tracing::info!(
            endpoint = %self.endpoint,
            session_id = %remote.session_id(),
            namespaces = inner.namespaces.len(),
            "Session established"
        );

        inner.remote = Some(remote);
        inner.state = SessionState::Connected;
        inner.unsuccessful_connections = 0;
        inner.missed_keep_alives = 0;
        Ok(())
    }

    // =========================================================================
    // Keep-alive
    // =========================================================================

    /// Routes keep-alive events from the transport into a task that holds
    /// the session weakly.
    fn install_keep_alive(&self, remote: &Arc<dyn RemoteSession>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<KeepAliveEvent>();
        let handler: KeepAliveHandler = Arc::new(move |event: KeepAliveEvent| {
            let _ = tx.send(event);
        });
        remote.set_keep_alive(self.settings.keep_alive_interval, handler);

        let session = self.me.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.handle_keep_alive(event).await;
            }
        });
    }

    /// Counts bad keep-alives and drops the session at the threshold.
    async fn handle_keep_alive(&self, event: KeepAliveEvent) {
        let mut inner = self.inner.lock().await;
        let current = inner.remote.as_ref().map(|r| r.session_id());
        if current.as_deref() != Some(event.session_id.as_str())
            || !inner.state.is_connected()
        {
            return;
        }

        if event.status.is_good() {
            if inner.missed_keep_alives > 0 {
                tracing::debug!(endpoint = %self.endpoint, "Keep-alive recovered");
            }
            inner.missed_keep_alives = 0;
            return;
        }

        inner.missed_keep_alives += 1;
        tracing::warn!(
            endpoint = %self.endpoint,
            status = %event.status,
            missed = inner.missed_keep_alives,
            threshold = self.settings.keep_alive_disconnect_threshold,
            "Keep-alive failed"
        );

        if inner.missed_keep_alives >= self.settings.keep_alive_disconnect_threshold {
            tracing::warn!(
                endpoint = %self.endpoint,
                "Keep-alive threshold reached, disconnecting"
            );
            self.disconnect_locked(&mut inner).await;
            self.stats.record_keep_alive_disconnect();
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Runs one pass: connect, additions, removals, pruning.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> PassReport {
        let connected = self.connect(cancel).await.is_connected();
        let added = if connected {
            self.monitor_additions(cancel).await
        } else {
            0
        };
        let removed = self.monitor_removals(cancel).await;
        let groups_pruned = self.prune_empty_groups(cancel).await;

        PassReport {
            connected: self.state().await.is_connected(),
            added,
            removed,
            groups_pruned,
        }
    }

    /// Activates every point that is not yet monitored.
    ///
    /// Returns the number of points activated.
    pub async fn monitor_additions(&self, cancel: &CancellationToken) -> usize {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.state.is_connected() {
            return 0;
        }
        let Some(remote) = inner.remote.clone() else {
            return 0;
        };
        let application_uri = remote.server_application_uri();

        let mut added = 0usize;
        let mut session_lost = false;

        'groups: for group in inner.groups.iter_mut() {
            if !group.has_pending_additions() {
                continue;
            }
            if cancel.is_cancelled() {
                break;
            }

            let subscription = match group.remote() {
                Some(subscription) => Arc::clone(subscription),
                None => {
                    let requested = group.requested_publishing_interval();
                    match remote.create_subscription(requested).await {
                        Ok(subscription) => {
                            tracing::info!(
                                endpoint = %self.endpoint,
                                subscription_id = %subscription.id(),
                                requested_ms = requested.as_millis() as u64,
                                revised_ms = subscription.revised_publishing_interval().as_millis() as u64,
                                "Created subscription"
                            );
                            group.attach(Arc::clone(&subscription));
                            subscription
                        }
                        Err(e) => {
                            e.log(&format!("create subscription on {}", self.endpoint));
                            if e.failure_class().is_fatal() {
                                session_lost = true;
                                break 'groups;
                            }
                            continue;
                        }
                    }
                }
            };

            let monitored_before = group.monitored_count();
            for point in group.points_mut() {
                if !point.state().needs_activation() {
                    continue;
                }
                if cancel.is_cancelled() {
                    break 'groups;
                }

                if point.state() == PointState::UnmonitoredPendingNamespaceUpdate {
                    if let Err(e) = point.normalize_namespace(&inner.namespaces) {
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            node = %point.configured_identity(),
                            error = %e,
                            "Namespace of node could not be normalized"
                        );
                    }
                }

                let node = match point.resolve_node_id(&inner.namespaces) {
                    Ok(node) => node,
                    Err(e) => {
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            node = %point.identity(),
                            error = %e,
                            "Node cannot be addressed and is skipped"
                        );
                        continue;
                    }
                };

                match self
                    .activate(&*remote, &*subscription, point, &node, application_uri.clone())
                    .await
                {
                    Ok((handle, display_name)) => {
                        if handle.revised_sampling_interval != point.settings().sampling_interval {
                            tracing::debug!(
                                node = %node,
                                requested_ms = point.settings().sampling_interval.as_millis() as u64,
                                revised_ms = handle.revised_sampling_interval.as_millis() as u64,
                                "Sampling interval revised"
                            );
                        }
                        point.mark_monitored(handle, display_name);
                        added += 1;
                        if added % PROGRESS_LOG_EVERY == 1 {
                            tracing::info!(
                                endpoint = %self.endpoint,
                                subscription_id = %subscription.id(),
                                monitored = monitored_before + added,
                                "Monitoring items"
                            );
                        }
                    }
                    Err(e) => match e.failure_class() {
                        FailureClass::TransportFatal => {
                            tracing::warn!(
                                endpoint = %self.endpoint,
                                error = %e,
                                "Session is no longer valid, cleaning up"
                            );
                            session_lost = true;
                            break 'groups;
                        }
                        FailureClass::ItemRecoverable => {
                            tracing::warn!(
                                endpoint = %self.endpoint,
                                node = %node,
                                error = %e,
                                "Failed to monitor node, check its configuration"
                            );
                        }
                        FailureClass::Transient => {
                            tracing::warn!(
                                endpoint = %self.endpoint,
                                node = %node,
                                error = %e,
                                "Failed to monitor node, continuing"
                            );
                        }
                    },
                }
            }
        }

        if session_lost {
            self.disconnect_locked(inner).await;
        }
        if added > 0 {
            self.stats.record_items_added(added);
            tracing::info!(
                endpoint = %self.endpoint,
                added,
                monitored = inner.groups.monitored_count(),
                "Done processing unmonitored items"
            );
        }
        added
    }

    /// Adds one point to its subscription.
    async fn activate(
        &self,
        remote: &dyn RemoteSession,
        subscription: &dyn RemoteSubscription,
        point: &MonitoredPoint,
        node: &NodeId,
        application_uri: Option<String>,
    ) -> OpcUaResult<(MonitoredItemHandle, String)> {
        let display_name = if self.settings.fetch_display_name {
            remote
                .read_display_name(node)
                .await?
                .trim()
                .to_string()
        } else {
            String::new()
        };
        let display_name = if display_name.is_empty() {
            node.to_string()
        } else {
            display_name
        };

        let context = TelemetryContext::new(
            &self.endpoint,
            point.configured_identity(),
            application_uri,
            display_name.clone(),
            Arc::clone(&self.telemetry),
        );
        let sink = Arc::clone(&self.sink);
        let handler: DataChangeHandler = Arc::new(move |notification: DataChangeNotification| {
            sink.publish(context.assemble(&notification))
        });

        let settings = point.settings();
        let request = MonitoredItemRequest {
            node_id: node.clone(),
            attribute_id: point.attribute_id(),
            display_name: display_name.clone(),
            monitoring_mode: settings.monitoring_mode,
            sampling_interval: settings.sampling_interval,
            queue_size: settings.queue_size,
            discard_oldest: settings.discard_oldest,
            handler,
        };

        let handle = subscription.add_item(request).await?;
        subscription.set_publishing_mode(true).await?;
        subscription.apply_changes().await?;

        tracing::debug!(
            endpoint = %self.endpoint,
            node = %node,
            subscription_id = %subscription.id(),
            "Created monitored item"
        );
        Ok((handle, display_name))
    }

    /// Drops every point tagged for removal.
    ///
    /// Remote removal is best effort; the points leave their groups either
    /// way. Returns the number of points dropped.
    pub async fn monitor_removals(&self, cancel: &CancellationToken) -> usize {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.state.is_connected() || cancel.is_cancelled() {
            return 0;
        }

        let mut removed = 0usize;
        for group in inner.groups.iter_mut() {
            let dropped = group.take_removal_requested();
            if dropped.is_empty() {
                continue;
            }
            removed += dropped.len();

            let handles: Vec<MonitoredItemHandle> =
                dropped.iter().filter_map(|p| p.handle().copied()).collect();
            if let (false, Some(subscription)) = (handles.is_empty(), group.remote()) {
                if let Err(e) = subscription.remove_items(&handles).await {
                    tracing::debug!(subscription_id = %subscription.id(), error = %e, "Removing items failed");
                }
                if let Err(e) = subscription.apply_changes().await {
                    tracing::debug!(subscription_id = %subscription.id(), error = %e, "Applying removals failed");
                }
            }

            tracing::info!(
                endpoint = %self.endpoint,
                removed = dropped.len(),
                remaining = group.len(),
                "Stopped monitoring items"
            );
        }

        if removed > 0 {
            self.stats.record_items_removed(removed);
        }
        removed
    }

    /// Tears down groups that hold no points.
    pub async fn prune_empty_groups(&self, cancel: &CancellationToken) -> usize {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_connected() || cancel.is_cancelled() {
            return 0;
        }

        let mut empty = inner.groups.take_empty();
        for group in empty.iter_mut() {
            if let Some(subscription) = group.detach() {
                self.delete_subscription(inner.remote.as_deref(), &*subscription)
                    .await;
                tracing::info!(
                    endpoint = %self.endpoint,
                    subscription_id = %subscription.id(),
                    "Removed empty subscription"
                );
            }
        }
        empty.len()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Queues a point for monitoring unless a live point with the same
    /// identity exists.
    pub async fn add_point(
        &self,
        identity: PointIdentity,
        publishing_interval: Option<Duration>,
        sampling_interval: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AddOutcome {
        if cancel.is_cancelled() {
            return AddOutcome::Cancelled;
        }
        let mut guard = self.inner.lock().await;
        if self.is_terminated() {
            return AddOutcome::SessionClosed;
        }
        let inner = &mut *guard;

        let (node, expanded) = candidates(&identity, inner);
        if inner
            .groups
            .is_published(node.as_ref(), expanded.as_ref(), &inner.namespaces)
        {
            tracing::debug!(endpoint = %self.endpoint, node = %identity, "Node is already published");
            return AddOutcome::AlreadyPublished;
        }

        let interval = publishing_interval.unwrap_or(self.settings.default_publishing_interval);
        tracing::debug!(
            endpoint = %self.endpoint,
            node = %identity,
            publishing_ms = interval.as_millis() as u64,
            "Queued node for monitoring"
        );
        let point = MonitoredPoint::new(identity, self.settings.point_settings(sampling_interval));
        inner.groups.ensure_group_for_interval(interval).push(point);
        AddOutcome::Added
    }

    /// Tags every point matching `identity` for removal.
    ///
    /// Returns `true` if at least one point was found and tagged.
    pub async fn request_point_removal(
        &self,
        identity: &PointIdentity,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let (node, expanded) = candidates(identity, inner);
        let tagged = inner
            .groups
            .request_removal(node.as_ref(), expanded.as_ref(), &inner.namespaces);
        tracing::debug!(endpoint = %self.endpoint, node = %identity, tagged, "Removal requested");
        tagged > 0
    }

    /// Returns `true` if a live point matches `identity`.
    pub async fn is_published(&self, identity: &PointIdentity) -> OpcUaResult<bool> {
        let guard = self.inner.lock().await;
        if self.is_terminated() {
            return Err(OpcUaError::terminated(&self.endpoint));
        }
        let (node, expanded) = candidates(identity, &guard);
        Ok(guard
            .groups
            .is_published(node.as_ref(), expanded.as_ref(), &guard.namespaces))
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drops the remote session; points stay and are re-activated after the
    /// next connect.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner).await;
    }

    /// Disconnects and releases every group and point. The session is not
    /// usable afterwards.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;

        for group in inner.groups.iter() {
            let handles: Vec<MonitoredItemHandle> = group
                .points()
                .iter()
                .filter_map(|p| p.handle().copied())
                .collect();
            if let (false, Some(subscription)) = (handles.is_empty(), group.remote()) {
                let _ = subscription.remove_items(&handles).await;
            }
        }

        self.disconnect_locked(&mut inner).await;
        let released = inner.groups.drain();
        self.terminated.store(true, Ordering::Release);

        tracing::info!(
            endpoint = %self.endpoint,
            groups = released.len(),
            "Session shut down"
        );
    }

    /// Marks the session terminated if it holds no groups and its guard is
    /// free. A busy session is left alone. Later adds see
    /// [`AddOutcome::SessionClosed`]; [`shutdown`](Self::shutdown) still has
    /// to run to close the remote side.
    pub fn try_retire(&self) -> bool {
        let Ok(inner) = self.inner.try_lock() else {
            return false;
        };
        if !inner.groups.is_empty() || self.is_terminated() {
            return false;
        }
        self.terminated.store(true, Ordering::Release);
        true
    }

    async fn disconnect_locked(&self, inner: &mut SessionInner) {
        for group in inner.groups.iter_mut() {
            if let Some(subscription) = group.detach() {
                self.delete_subscription(inner.remote.as_deref(), &*subscription)
                    .await;
            }
            group.revoke_all();
        }

        if let Some(remote) = inner.remote.take() {
            remote.clear_keep_alive();
            if let Err(e) = remote.close().await {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Closing session failed");
            }
            tracing::info!(endpoint = %self.endpoint, "Session disconnected");
        }
        inner.state = SessionState::Disconnected;
        inner.missed_keep_alives = 0;
    }

    async fn delete_subscription(
        &self,
        remote: Option<&dyn RemoteSession>,
        subscription: &dyn RemoteSubscription,
    ) {
        if let Some(remote) = remote {
            if let Err(e) = remote.remove_subscription(subscription).await {
                tracing::debug!(subscription_id = %subscription.id(), error = %e, "Removing subscription failed");
            }
        }
        if let Err(e) = subscription.delete().await {
            tracing::debug!(subscription_id = %subscription.id(), error = %e, "Deleting subscription failed");
        }
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("endpoint", &self.endpoint)
            .field("use_security", &self.use_security)
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Builds both addressing forms of `identity` when the namespace table is
/// current.
fn candidates(
    identity: &PointIdentity,
    inner: &SessionInner,
) -> (Option<NodeId>, Option<ExpandedNodeId>) {
    let connected = inner.state.is_connected();
    match identity {
        PointIdentity::Node(node) => {
            let expanded = connected
                .then(|| inner.namespaces.to_expanded(node).ok())
                .flatten();
            (Some(node.clone()), expanded)
        }
        PointIdentity::Expanded(expanded) => {
            let node = connected
                .then(|| inner.namespaces.to_node_id(expanded).ok())
                .flatten();
            (node, Some(expanded.clone()))
        }
    }
}

/// Extracts the namespace URIs from the namespace array value.
fn namespace_uris(value: OpcUaValue) -> OpcUaResult<Vec<String>> {
    let node = WellKnownNode::NamespaceArray.node_id().to_string();
    match value {
        OpcUaValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                OpcUaValue::String(uri) => Ok(uri),
                other => Err(OpcUaError::unexpected_value(
                    &node,
                    format!("unexpected namespace entry {other:?}"),
                )),
            })
            .collect(),
        other => Err(OpcUaError::unexpected_value(
            &node,
            format!("expected a string array, got {other:?}"),
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
