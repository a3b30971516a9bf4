// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Boundary to the OPC UA protocol stack.
//!
//! The engine never talks to the wire directly. Everything it needs from a
//! server goes through three traits:
//!
//! - [`OpcUaTransport`]: endpoint discovery and session establishment
//! - [`RemoteSession`]: reads, keep-alive registration and subscriptions
//! - [`RemoteSubscription`]: monitored item management
//!
//! Tests drive the engine through a scriptable implementation of these
//! traits; production code plugs in a real protocol stack.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OpcUaResult, StatusCode};
use crate::types::{AttributeId, MonitoringMode, NodeId, OpcUaValue};

use super::subscription::SubscriptionId;

// =============================================================================
// Well-known nodes
// =============================================================================

/// Server nodes read while establishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownNode {
    /// `Server_NamespaceArray`.
    NamespaceArray,
    /// `Server_ServerCapabilities_MinSupportedSampleRate`.
    MinSupportedSampleRate,
}

impl WellKnownNode {
    /// Returns the node id in namespace 0.
    pub const fn node_id(&self) -> NodeId {
        match self {
            Self::NamespaceArray => NodeId::numeric(0, 2255),
            Self::MinSupportedSampleRate => NodeId::numeric(0, 2272),
        }
    }
}

// =============================================================================
// Endpoint and session requests
// =============================================================================

/// An endpoint selected for session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub url: String,

    /// Whether the endpoint offers a secured channel.
    pub secured: bool,

    /// Security policy URI reported by the server.
    pub security_policy_uri: String,
}

impl EndpointDescription {
    /// Creates an unsecured endpoint description.
    pub fn unsecured(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secured: false,
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None".to_string(),
        }
    }
}

/// Parameters for a new session. Sessions always use anonymous identity.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Name of the client application.
    pub application_name: String,

    /// Session name shown in server diagnostics.
    pub session_name: String,

    /// Requested session timeout.
    pub timeout: Duration,
}

// =============================================================================
// Monitored items
// =============================================================================

/// Callback invoked for each data change of a monitored item.
pub type DataChangeHandler = Arc<dyn Fn(DataChangeNotification) + Send + Sync>;

/// Callback invoked for each keep-alive reported by the session.
pub type KeepAliveHandler = Arc<dyn Fn(KeepAliveEvent) + Send + Sync>;

/// Request to add a monitored item to a subscription.
#[derive(Clone)]
pub struct MonitoredItemRequest {
    /// Resolved node id.
    pub node_id: NodeId,

    /// Attribute to monitor.
    pub attribute_id: AttributeId,

    /// Display name used for telemetry.
    pub display_name: String,

    /// Monitoring mode.
    pub monitoring_mode: MonitoringMode,

    /// Requested sampling interval.
    pub sampling_interval: Duration,

    /// Server-side queue size.
    pub queue_size: u32,

    /// Whether the oldest queued value is dropped on overflow.
    pub discard_oldest: bool,

    /// Notification callback.
    pub handler: DataChangeHandler,
}

impl fmt::Debug for MonitoredItemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredItemRequest")
            .field("node_id", &self.node_id)
            .field("display_name", &self.display_name)
            .field("sampling_interval", &self.sampling_interval)
            .field("queue_size", &self.queue_size)
            .finish_non_exhaustive()
    }
}

/// Server-side handle for an activated monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitoredItemHandle {
    /// Client handle assigned when the item was added.
    pub client_handle: u32,

    /// Sampling interval revised by the server.
    pub revised_sampling_interval: Duration,
}

/// A single data change reported for a monitored item.
#[derive(Debug, Clone)]
pub struct DataChangeNotification {
    /// New value.
    pub value: OpcUaValue,

    /// Status of the value.
    pub status: StatusCode,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataChangeNotification {
    /// Creates a good notification stamped with the current time.
    pub fn good(value: OpcUaValue) -> Self {
        let now = Utc::now();
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }
}

/// Keep-alive report from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveEvent {
    /// Id of the session that produced the keep-alive.
    pub session_id: String,

    /// Status of the keep-alive.
    pub status: StatusCode,
}

// =============================================================================
// Traits
// =============================================================================

/// Entry point into the protocol stack.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Discovers the endpoint to use for `url`.
    async fn select_endpoint(&self, url: &str, use_security: bool)
        -> OpcUaResult<EndpointDescription>;

    /// Creates and activates a session on the endpoint.
    async fn create_session(
        &self,
        endpoint: &EndpointDescription,
        request: SessionRequest,
    ) -> OpcUaResult<Arc<dyn RemoteSession>>;
}

/// An established session on a server.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Server-assigned session id.
    fn session_id(&self) -> String;

    /// Application URI of the server, if reported.
    fn server_application_uri(&self) -> Option<String>;

    /// Reads the value attribute of a node.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<OpcUaValue>;

    /// Reads the display name attribute of a node.
    async fn read_display_name(&self, node_id: &NodeId) -> OpcUaResult<String>;

    /// Installs the keep-alive handler, replacing any previous one.
    fn set_keep_alive(&self, interval: Duration, handler: KeepAliveHandler);

    /// Removes the keep-alive handler.
    fn clear_keep_alive(&self);

    /// Creates a subscription with the requested publishing interval.
    async fn create_subscription(
        &self,
        publishing_interval: Duration,
    ) -> OpcUaResult<Arc<dyn RemoteSubscription>>;

    /// Removes a subscription from the session.
    async fn remove_subscription(&self, subscription: &dyn RemoteSubscription) -> OpcUaResult<()>;

    /// Closes the session.
    async fn close(&self) -> OpcUaResult<()>;
}

/// A subscription living on a server.
#[async_trait]
pub trait RemoteSubscription: Send + Sync {
    /// Server-assigned subscription id.
    fn id(&self) -> SubscriptionId;

    /// Publishing interval revised by the server.
    fn revised_publishing_interval(&self) -> Duration;

    /// Adds a monitored item.
    async fn add_item(&self, request: MonitoredItemRequest) -> OpcUaResult<MonitoredItemHandle>;

    /// Removes monitored items.
    async fn remove_items(&self, handles: &[MonitoredItemHandle]) -> OpcUaResult<()>;

    /// Enables or disables publishing.
    async fn set_publishing_mode(&self, enabled: bool) -> OpcUaResult<()>;

    /// Commits pending item changes to the server.
    async fn apply_changes(&self) -> OpcUaResult<()>;

    /// Deletes the subscription on the server.
    async fn delete(&self) -> OpcUaResult<()>;
}

// =============================================================================
// Tests
// =============================================================================
