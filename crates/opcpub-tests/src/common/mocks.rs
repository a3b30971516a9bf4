// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! An in-memory OPC UA server behind [`MockTransport`].
//!
//! ## Design Principles
//!
//! - Scriptable server behaviour (namespace table, failures, latency)
//! - Recording of every remote call for verification
//! - Thread-safe; handlers are always invoked outside the state lock

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use opcpub_opcua::client::{DataChangeHandler, KeepAliveHandler};
use opcpub_opcua::{
    ConnectionError, DataChangeNotification, EndpointDescription, KeepAliveEvent,
    MonitoredItemHandle, MonitoredItemRequest, NodeId, OpcUaError, OpcUaResult, OpcUaTransport,
    OpcUaValue, RemoteSession, RemoteSubscription, SessionRequest, StatusCode, SubscriptionId,
    WellKnownNode,
};

use super::fixtures::Namespaces;

// =============================================================================
// Recorded calls
// =============================================================================

/// A remote call observed by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// Endpoint discovery.
    SelectEndpoint {
        /// Requested endpoint URL.
        url: String,
        /// Whether a secured endpoint was asked for.
        use_security: bool,
    },
    /// Session creation.
    CreateSession {
        /// Id assigned to the new session.
        session_id: String,
        /// Requested session timeout.
        timeout: Duration,
    },
    /// Value read.
    ReadValue {
        /// Node read.
        node: String,
    },
    /// Display name read.
    ReadDisplayName {
        /// Node read.
        node: String,
    },
    /// Subscription creation.
    CreateSubscription {
        /// Id assigned to the subscription.
        id: u32,
        /// Requested publishing interval.
        publishing_interval: Duration,
    },
    /// Monitored item creation.
    AddItem {
        /// Owning subscription.
        subscription: u32,
        /// Monitored node.
        node: String,
        /// Requested sampling interval.
        sampling_interval: Duration,
    },
    /// Batched monitored item removal.
    RemoveItems {
        /// Owning subscription.
        subscription: u32,
        /// Number of items in the batch.
        count: usize,
    },
    /// Subscription removal from a session.
    RemoveSubscription {
        /// Subscription id.
        id: u32,
    },
    /// Subscription deletion.
    DeleteSubscription {
        /// Subscription id.
        id: u32,
    },
    /// Session close.
    CloseSession {
        /// Closed session id.
        session_id: String,
    },
}

// =============================================================================
// Server state
// =============================================================================

struct MockItem {
    node_id: NodeId,
    handler: DataChangeHandler,
}

struct MockSubscriptionState {
    session_id: String,
    deleted: bool,
    items: BTreeMap<u32, MockItem>,
}

struct ServerState {
    namespaces: Vec<String>,
    application_uri: Option<String>,
    min_sample_rate_ms: Option<f64>,
    revised_publishing_interval: Option<Duration>,
    connect_failures: usize,
    connect_delay: Option<Duration>,
    fail_namespace_read: bool,
    session_seq: u32,
    subscription_seq: u32,
    handle_seq: u32,
    live_sessions: HashSet<String>,
    keep_alive: HashMap<String, KeepAliveHandler>,
    subscriptions: BTreeMap<u32, MockSubscriptionState>,
    rejected_nodes: HashMap<String, StatusCode>,
    display_names: HashMap<String, String>,
    display_name_failures: HashMap<String, StatusCode>,
    display_name_delay: Option<Duration>,
    calls: Vec<MockCall>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            namespaces: Namespaces::standard(),
            application_uri: Some("urn:mock:server".to_string()),
            min_sample_rate_ms: Some(50.0),
            revised_publishing_interval: None,
            connect_failures: 0,
            connect_delay: None,
            fail_namespace_read: false,
            session_seq: 0,
            subscription_seq: 0,
            handle_seq: 0,
            live_sessions: HashSet::new(),
            keep_alive: HashMap::new(),
            subscriptions: BTreeMap::new(),
            rejected_nodes: HashMap::new(),
            display_names: HashMap::new(),
            display_name_failures: HashMap::new(),
            display_name_delay: None,
            calls: Vec::new(),
        }
    }
}

fn stale(session_id: &str) -> OpcUaError {
    OpcUaError::bad_status(
        format!("call on session {session_id}"),
        StatusCode::BAD_SESSION_ID_INVALID,
    )
}

// =============================================================================
// MockTransport
// =============================================================================

/// A scriptable in-memory OPC UA server.
///
/// Clones share the same server.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<ServerState>>,
}

impl MockTransport {
    /// Creates a server with the standard namespace table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the namespace table returned on the next connect.
    pub fn set_namespaces<I, S>(&self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().namespaces = uris.into_iter().map(Into::into).collect();
    }

    /// Sets the application URI reported by sessions.
    pub fn set_application_uri(&self, uri: Option<&str>) {
        self.state.lock().application_uri = uri.map(str::to_string);
    }

    /// Sets the advertised minimum sampling rate, or makes the read fail.
    pub fn set_min_sample_rate_ms(&self, rate: Option<f64>) {
        self.state.lock().min_sample_rate_ms = rate;
    }

    /// Forces every subscription to report this publishing interval.
    pub fn revise_publishing_interval(&self, interval: Duration) {
        self.state.lock().revised_publishing_interval = Some(interval);
    }

    /// Makes the next `count` endpoint selections fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().connect_failures = count;
    }

    /// Delays session creation.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    /// Makes the namespace array read fail.
    pub fn fail_namespace_read(&self, fail: bool) {
        self.state.lock().fail_namespace_read = fail;
    }

    /// Makes adding `node` fail with `status`.
    pub fn reject_node(&self, node: &NodeId, status: StatusCode) {
        self.state
            .lock()
            .rejected_nodes
            .insert(node.to_string(), status);
    }

    /// Removes every scripted item rejection and display name failure.
    pub fn clear_rejections(&self) {
        let mut state = self.state.lock();
        state.rejected_nodes.clear();
        state.display_name_failures.clear();
    }

    /// Sets the display name returned for `node`.
    pub fn set_display_name(&self, node: &NodeId, name: &str) {
        self.state
            .lock()
            .display_names
            .insert(node.to_string(), name.to_string());
    }

    /// Makes the display name read of `node` fail with `status`.
    pub fn fail_display_name(&self, node: &NodeId, status: StatusCode) {
        self.state
            .lock()
            .display_name_failures
            .insert(node.to_string(), status);
    }

    /// Delays every display name read.
    pub fn set_display_name_delay(&self, delay: Option<Duration>) {
        self.state.lock().display_name_delay = delay;
    }

    /// Invalidates every live session; further calls on them fail with
    /// `BadSessionIdInvalid`.
    pub fn invalidate_sessions(&self) {
        let mut state = self.state.lock();
        state.live_sessions.clear();
        for subscription in state.subscriptions.values_mut() {
            subscription.deleted = true;
        }
    }

    /// Delivers a keep-alive with `status` to every registered handler.
    ///
    /// Returns the number of handlers invoked.
    pub fn fire_keep_alive(&self, status: StatusCode) -> usize {
        let handlers: Vec<(String, KeepAliveHandler)> = self
            .state
            .lock()
            .keep_alive
            .iter()
            .map(|(id, handler)| (id.clone(), Arc::clone(handler)))
            .collect();

        for (session_id, handler) in &handlers {
            handler(KeepAliveEvent {
                session_id: session_id.clone(),
                status,
            });
        }
        handlers.len()
    }

    /// Delivers a data change to every active item monitoring `node`.
    ///
    /// Returns the number of items notified.
    pub fn push_value(&self, node: &NodeId, value: OpcUaValue) -> usize {
        self.push_notification(node, DataChangeNotification::good(value))
    }

    /// Delivers `notification` to every active item monitoring `node`.
    pub fn push_notification(&self, node: &NodeId, notification: DataChangeNotification) -> usize {
        let handlers: Vec<DataChangeHandler> = {
            let state = self.state.lock();
            state
                .subscriptions
                .values()
                .filter(|s| !s.deleted)
                .flat_map(|s| s.items.values())
                .filter(|item| &item.node_id == node)
                .map(|item| Arc::clone(&item.handler))
                .collect()
        };

        for handler in &handlers {
            handler(notification.clone());
        }
        handlers.len()
    }

    /// Number of items on live subscriptions.
    pub fn active_item_count(&self) -> usize {
        let state = self.state.lock();
        state
            .subscriptions
            .values()
            .filter(|s| !s.deleted && state.live_sessions.contains(&s.session_id))
            .map(|s| s.items.len())
            .sum()
    }

    /// Node ids of the items on live subscriptions.
    pub fn active_items(&self) -> Vec<NodeId> {
        let state = self.state.lock();
        state
            .subscriptions
            .values()
            .filter(|s| !s.deleted && state.live_sessions.contains(&s.session_id))
            .flat_map(|s| s.items.values().map(|item| item.node_id.clone()))
            .collect()
    }

    /// Number of subscriptions not yet deleted.
    pub fn live_subscription_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|s| !s.deleted)
            .count()
    }

    /// Number of open sessions.
    pub fn live_session_count(&self) -> usize {
        self.state.lock().live_sessions.len()
    }

    /// Number of registered keep-alive handlers.
    pub fn keep_alive_handler_count(&self) -> usize {
        self.state.lock().keep_alive.len()
    }

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Timeouts requested by every session creation, oldest first.
    pub fn session_timeouts(&self) -> Vec<Duration> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::CreateSession { timeout, .. } => Some(*timeout),
                _ => None,
            })
            .collect()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: MockCall) {
        self.state.lock().calls.push(call);
    }

    fn ensure_live(&self, session_id: &str) -> OpcUaResult<()> {
        if self.state.lock().live_sessions.contains(session_id) {
            Ok(())
        } else {
            Err(stale(session_id))
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("live_sessions", &state.live_sessions.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn select_endpoint(
        &self,
        url: &str,
        use_security: bool,
    ) -> OpcUaResult<EndpointDescription> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SelectEndpoint {
            url: url.to_string(),
            use_security,
        });
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ConnectionError::unreachable(url, "mock connect failure").into());
        }
        Ok(EndpointDescription {
            url: url.to_string(),
            secured: use_security,
            security_policy_uri: if use_security {
                "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256".to_string()
            } else {
                "http://opcfoundation.org/UA/SecurityPolicy#None".to_string()
            },
        })
    }

    async fn create_session(
        &self,
        _endpoint: &EndpointDescription,
        request: SessionRequest,
    ) -> OpcUaResult<Arc<dyn RemoteSession>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.session_seq += 1;
        let session_id = format!("mock-session-{}", state.session_seq);
        state.live_sessions.insert(session_id.clone());
        state.calls.push(MockCall::CreateSession {
            session_id: session_id.clone(),
            timeout: request.timeout,
        });

        Ok(Arc::new(MockSession {
            id: session_id,
            application_uri: state.application_uri.clone(),
            server: self.clone(),
        }))
    }
}

// =============================================================================
// MockSession
// =============================================================================

struct MockSession {
    id: String,
    application_uri: Option<String>,
    server: MockTransport,
}

#[async_trait]
impl RemoteSession for MockSession {
    fn session_id(&self) -> String {
        self.id.clone()
    }

    fn server_application_uri(&self) -> Option<String> {
        self.application_uri.clone()
    }

    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<OpcUaValue> {
        self.server.record(MockCall::ReadValue {
            node: node_id.to_string(),
        });
        self.server.ensure_live(&self.id)?;

        let state = self.server.state.lock();
        if *node_id == WellKnownNode::NamespaceArray.node_id() {
            if state.fail_namespace_read {
                return Err(OpcUaError::unexpected_value(
                    node_id.to_string(),
                    "mock namespace read failure",
                ));
            }
            return Ok(OpcUaValue::Array(
                state
                    .namespaces
                    .iter()
                    .cloned()
                    .map(OpcUaValue::String)
                    .collect(),
            ));
        }
        if *node_id == WellKnownNode::MinSupportedSampleRate.node_id() {
            return state
                .min_sample_rate_ms
                .map(OpcUaValue::Double)
                .ok_or_else(|| OpcUaError::bad_status("read", StatusCode::BAD_NOT_FOUND));
        }
        Err(OpcUaError::bad_status("read", StatusCode::BAD_NODE_ID_UNKNOWN))
    }

    async fn read_display_name(&self, node_id: &NodeId) -> OpcUaResult<String> {
        self.server.record(MockCall::ReadDisplayName {
            node: node_id.to_string(),
        });
        self.server.ensure_live(&self.id)?;

        let delay = self.server.state.lock().display_name_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.server.state.lock();
        let key = node_id.to_string();
        if let Some(status) = state.display_name_failures.get(&key) {
            return Err(OpcUaError::bad_status("read display name", *status));
        }
        Ok(state.display_names.get(&key).cloned().unwrap_or_default())
    }

    fn set_keep_alive(&self, _interval: Duration, handler: KeepAliveHandler) {
        self.server
            .state
            .lock()
            .keep_alive
            .insert(self.id.clone(), handler);
    }

    fn clear_keep_alive(&self) {
        self.server.state.lock().keep_alive.remove(&self.id);
    }

    async fn create_subscription(
        &self,
        publishing_interval: Duration,
    ) -> OpcUaResult<Arc<dyn RemoteSubscription>> {
        self.server.ensure_live(&self.id)?;

        let mut state = self.server.state.lock();
        state.subscription_seq += 1;
        let id = state.subscription_seq;
        state.subscriptions.insert(
            id,
            MockSubscriptionState {
                session_id: self.id.clone(),
                deleted: false,
                items: BTreeMap::new(),
            },
        );
        state.calls.push(MockCall::CreateSubscription {
            id,
            publishing_interval,
        });

        Ok(Arc::new(MockSubscription {
            id,
            session_id: self.id.clone(),
            revised_publishing_interval: state
                .revised_publishing_interval
                .unwrap_or(publishing_interval),
            server: self.server.clone(),
        }))
    }

    async fn remove_subscription(&self, subscription: &dyn RemoteSubscription) -> OpcUaResult<()> {
        let id = subscription.id().0;
        self.server.record(MockCall::RemoveSubscription { id });
        self.server.ensure_live(&self.id)?;
        if let Some(s) = self.server.state.lock().subscriptions.get_mut(&id) {
            s.deleted = true;
        }
        Ok(())
    }

    async fn close(&self) -> OpcUaResult<()> {
        self.server.record(MockCall::CloseSession {
            session_id: self.id.clone(),
        });
        let mut state = self.server.state.lock();
        state.keep_alive.remove(&self.id);
        if state.live_sessions.remove(&self.id) {
            Ok(())
        } else {
            Err(OpcUaError::bad_status("close", StatusCode::BAD_SESSION_CLOSED))
        }
    }
}

// =============================================================================
// MockSubscription
// =============================================================================

struct MockSubscription {
    id: u32,
    session_id: String,
    revised_publishing_interval: Duration,
    server: MockTransport,
}

#[async_trait]
impl RemoteSubscription for MockSubscription {
    fn id(&self) -> SubscriptionId {
        SubscriptionId::new(self.id)
    }

    fn revised_publishing_interval(&self) -> Duration {
        self.revised_publishing_interval
    }

    async fn add_item(&self, request: MonitoredItemRequest) -> OpcUaResult<MonitoredItemHandle> {
        let node = request.node_id.to_string();
        self.server.record(MockCall::AddItem {
            subscription: self.id,
            node: node.clone(),
            sampling_interval: request.sampling_interval,
        });
        self.server.ensure_live(&self.session_id)?;

        let mut state = self.server.state.lock();
        if let Some(status) = state.rejected_nodes.get(&node).copied() {
            return Err(OpcUaError::item_rejected(node, status));
        }

        let revised = match state.min_sample_rate_ms {
            Some(ms) => request
                .sampling_interval
                .max(Duration::from_secs_f64(ms / 1000.0)),
            None => request.sampling_interval,
        };
        state.handle_seq += 1;
        let client_handle = state.handle_seq;
        let subscription = state.subscriptions.get_mut(&self.id).ok_or_else(|| {
            OpcUaError::bad_status("add item", StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
        })?;
        subscription.items.insert(
            client_handle,
            MockItem {
                node_id: request.node_id,
                handler: request.handler,
            },
        );

        Ok(MonitoredItemHandle {
            client_handle,
            revised_sampling_interval: revised,
        })
    }

    async fn remove_items(&self, handles: &[MonitoredItemHandle]) -> OpcUaResult<()> {
        self.server.record(MockCall::RemoveItems {
            subscription: self.id,
            count: handles.len(),
        });
        self.server.ensure_live(&self.session_id)?;
        if let Some(s) = self.server.state.lock().subscriptions.get_mut(&self.id) {
            for handle in handles {
                s.items.remove(&handle.client_handle);
            }
        }
        Ok(())
    }

    async fn set_publishing_mode(&self, _enabled: bool) -> OpcUaResult<()> {
        self.server.ensure_live(&self.session_id)
    }

    async fn apply_changes(&self) -> OpcUaResult<()> {
        self.server.ensure_live(&self.session_id)
    }

    async fn delete(&self) -> OpcUaResult<()> {
        self.server.record(MockCall::DeleteSubscription { id: self.id });
        if let Some(s) = self.server.state.lock().subscriptions.get_mut(&self.id) {
            s.deleted = true;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failures_are_consumed() {
        let server = MockTransport::new();
        server.fail_next_connects(1);

        assert!(server.select_endpoint("opc.tcp://x", false).await.is_err());
        assert!(server.select_endpoint("opc.tcp://x", false).await.is_ok());
        assert_eq!(
            server.count_calls(|c| matches!(c, MockCall::SelectEndpoint { .. })),
            2
        );
    }

    #[tokio::test]
    async fn test_invalidated_session_rejects_calls() {
        let server = MockTransport::new();
        let endpoint = server.select_endpoint("opc.tcp://x", false).await.unwrap();
        let session = server
            .create_session(
                &endpoint,
                SessionRequest {
                    application_name: "test".into(),
                    session_name: "test".into(),
                    timeout: Duration::from_secs(1),
                },
            )
            .await
            .unwrap();

        assert!(session
            .read_value(&WellKnownNode::NamespaceArray.node_id())
            .await
            .is_ok());
        server.invalidate_sessions();
        let err = session
            .create_subscription(Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(err.failure_class().is_fatal());
    }
}
