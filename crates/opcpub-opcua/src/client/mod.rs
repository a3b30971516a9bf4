// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-endpoint client state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ConnectionSession                            │
//! │        (connect, keep-alive, additions, removals, prune)        │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             PointGroups ─▶ PointGroup ─▶ MonitoredPoint         │
//! │          (one group per requested publishing interval)          │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      OpcUaTransport / RemoteSession / RemoteSubscription        │
//! │                 (protocol stack boundary)                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod item;
mod namespace;
mod session;
pub mod subscription;
mod transport;

pub use item::{MonitoredPoint, PointSettings, PointState};
pub use namespace::NamespaceResolver;
pub use session::{
    AddOutcome, ConnectOutcome, ConnectionSession, PassReport, SessionState, SessionStats,
};
pub use subscription::{PointGroup, PointGroups, SubscriptionId};
pub use transport::{
    DataChangeHandler, DataChangeNotification, EndpointDescription, KeepAliveEvent,
    KeepAliveHandler, MonitoredItemHandle, MonitoredItemRequest, OpcUaTransport, RemoteSession,
    RemoteSubscription, SessionRequest, WellKnownNode,
};
