// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session, subscription and monitored item reconciliation.
//!
//! This crate keeps a dynamic set of points streamed from many OPC UA
//! servers. External callers add and remove points through the
//! [`SessionRegistry`]; the [`ReconciliationLoop`] converges every
//! [`ConnectionSession`] towards that desired state, periodically and after
//! each request.
//!
//! # Features
//!
//! - One session per endpoint, with connect backoff and keep-alive loss detection
//! - One subscription per distinct publishing interval
//! - Identity matching across namespace-index and namespace-URI addressing
//! - Telemetry records assembled from data changes
//! - Bounded, awaitable reconciliation passes
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint and session creation failures
//! ├── Session       - Invalidated or terminated sessions
//! ├── Subscription  - Subscription and monitored item failures
//! ├── Operation     - Read and service failures
//! ├── Namespace     - Namespace table lookups
//! └── Configuration - Invalid settings
//! ```
//!
//! Every error maps to a [`FailureClass`] that decides what a pass does
//! next: tear down the session, skip the point, or carry on.
//!
//! The protocol stack itself sits behind [`OpcUaTransport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use opcpub_opcua::{ChannelSink, EngineSettings, ReconciliationLoop, SessionRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = Arc::new(EngineSettings::default());
//! let (sink, mut records) = ChannelSink::new(1024);
//! let registry = SessionRegistry::new(transport, settings.clone(), Arc::new(sink));
//! let engine = ReconciliationLoop::start(registry.clone(), settings, CancellationToken::new());
//!
//! registry
//!     .add_point_for_monitoring("opc.tcp://plc:4840", "ns=2;i=1001".parse()?, None, None)
//!     .await;
//! engine.wait_idle().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod settings;
pub mod telemetry;
pub mod types;

pub use error::{
    ConnectionError, FailureClass, NamespaceError, OpcUaError, OpcUaResult, StatusCode,
};

pub use types::{
    AttributeId, ExpandedNodeId, MonitoringMode, NodeId, NodeIdentifier, OpcUaValue,
    PointIdentity,
};

pub use client::{
    AddOutcome, ConnectOutcome, ConnectionSession, DataChangeNotification, EndpointDescription,
    KeepAliveEvent, MonitoredItemHandle, MonitoredItemRequest, MonitoredPoint, NamespaceResolver,
    OpcUaTransport, PassReport, PointGroup, PointSettings, PointState, RemoteSession,
    RemoteSubscription, SessionRequest, SessionState, SessionStats, SubscriptionId, WellKnownNode,
};

pub use reconcile::{ConfigurationChanged, ReconcileRequest, ReconcileScheduler, ReconciliationLoop};
pub use registry::{PublishedEndpoint, PublishedNode, SessionRegistry};
pub use settings::EngineSettings;
pub use telemetry::{ChannelSink, DiscardSink, MessageData, TelemetryContext, TelemetrySink};
