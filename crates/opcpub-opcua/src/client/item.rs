// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored points and their state machine.
//!
//! ```text
//!  UnmonitoredPendingNamespaceUpdate ──normalize──▶ Unmonitored ◀──revoke── Monitored
//!                 │                                    │  └────activate────────▲
//!                 └──────────────┬─────────────────────┘                       │
//!                                ▼                                             │
//!                        RemovalRequested ◀──────────────────────────────────────┘
//! ```
//!
//! A point configured by namespace URI starts pending a namespace update
//! because its index is not known until the session has read the server's
//! namespace table.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NamespaceError;
use crate::types::{AttributeId, ExpandedNodeId, MonitoringMode, NodeId, PointIdentity};

use super::namespace::NamespaceResolver;
use super::transport::MonitoredItemHandle;

// =============================================================================
// PointState
// =============================================================================

/// Lifecycle state of a monitored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointState {
    /// Not active on the server; activated on the next pass.
    #[default]
    Unmonitored,

    /// Waiting for the namespace table before it can be addressed.
    UnmonitoredPendingNamespaceUpdate,

    /// Active on the server.
    Monitored,

    /// Logically removed; dropped from its group on the next pass.
    RemovalRequested,
}

impl PointState {
    /// Returns `true` if the point is active on the server.
    #[inline]
    pub const fn is_monitored(&self) -> bool {
        matches!(self, Self::Monitored)
    }

    /// Returns `true` if the point has been tagged for removal.
    #[inline]
    pub const fn is_removal_requested(&self) -> bool {
        matches!(self, Self::RemovalRequested)
    }

    /// Returns `true` if the next addition pass should try to activate it.
    #[inline]
    pub const fn needs_activation(&self) -> bool {
        matches!(self, Self::Unmonitored | Self::UnmonitoredPendingNamespaceUpdate)
    }
}

impl fmt::Display for PointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmonitored => write!(f, "Unmonitored"),
            Self::UnmonitoredPendingNamespaceUpdate => write!(f, "UnmonitoredPendingNamespaceUpdate"),
            Self::Monitored => write!(f, "Monitored"),
            Self::RemovalRequested => write!(f, "RemovalRequested"),
        }
    }
}

// =============================================================================
// PointSettings
// =============================================================================

/// Sampling parameters requested for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointSettings {
    /// Requested sampling interval.
    pub sampling_interval: Duration,

    /// Server-side queue size.
    pub queue_size: u32,

    /// Whether the oldest queued value is dropped on overflow.
    pub discard_oldest: bool,

    /// Monitoring mode.
    pub monitoring_mode: MonitoringMode,
}

impl Default for PointSettings {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(1000),
            queue_size: 0,
            discard_oldest: true,
            monitoring_mode: MonitoringMode::Reporting,
        }
    }
}

// =============================================================================
// MonitoredPoint
// =============================================================================

/// A single data point under management.
#[derive(Debug, Clone)]
pub struct MonitoredPoint {
    /// Identity used for matching and remote addressing.
    identity: PointIdentity,

    /// Identity exactly as configured.
    configured: PointIdentity,

    state: PointState,
    attribute_id: AttributeId,
    settings: PointSettings,
    revised_sampling_interval: Option<Duration>,
    display_name: Option<String>,
    handle: Option<MonitoredItemHandle>,
}

impl MonitoredPoint {
    /// Creates a point in its initial state.
    pub fn new(identity: PointIdentity, settings: PointSettings) -> Self {
        let state = if identity.is_expanded() {
            PointState::UnmonitoredPendingNamespaceUpdate
        } else {
            PointState::Unmonitored
        };
        Self {
            configured: identity.clone(),
            identity,
            state,
            attribute_id: AttributeId::Value,
            settings,
            revised_sampling_interval: None,
            display_name: None,
            handle: None,
        }
    }

    /// Identity used for matching; namespace URIs are normalized to indexes.
    pub fn identity(&self) -> &PointIdentity {
        &self.identity
    }

    /// Identity as it was queued.
    pub fn configured_identity(&self) -> &PointIdentity {
        &self.configured
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PointState {
        self.state
    }

    /// Attribute that is monitored.
    pub fn attribute_id(&self) -> AttributeId {
        self.attribute_id
    }

    /// Monitoring parameters.
    pub fn settings(&self) -> &PointSettings {
        &self.settings
    }

    /// Sampling interval revised by the server, once monitored.
    pub fn revised_sampling_interval(&self) -> Option<Duration> {
        self.revised_sampling_interval
    }

    /// Display name resolved at activation.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Remote handle, present only while monitored.
    pub fn handle(&self) -> Option<&MonitoredItemHandle> {
        self.handle.as_ref()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Rewrites the identity into the form usable for remote addressing and
    /// drops to `Unmonitored`.
    ///
    /// The point leaves the pending state even when normalization fails; the
    /// resolution that follows then skips it until the table knows its URI.
    pub fn normalize_namespace(&mut self, namespaces: &NamespaceResolver) -> Result<(), NamespaceError> {
        if self.state == PointState::UnmonitoredPendingNamespaceUpdate {
            self.state = PointState::Unmonitored;
        }
        match &self.identity {
            PointIdentity::Expanded(id) => match id.namespace_uri() {
                Some(uri) => {
                    let index = namespaces
                        .index_of(uri)
                        .ok_or_else(|| NamespaceError::unknown_uri(uri))?;
                    self.identity = PointIdentity::Expanded(ExpandedNodeId::resolved(
                        Some(uri.to_string()),
                        index,
                        id.identifier.clone(),
                    ));
                }
                None => {
                    let uri = namespaces
                        .uri_of(id.namespace_index)
                        .ok_or_else(|| NamespaceError::unknown_index(id.namespace_index))?;
                    self.identity = PointIdentity::Expanded(ExpandedNodeId::resolved(
                        Some(uri.to_string()),
                        id.namespace_index,
                        id.identifier.clone(),
                    ));
                }
            },
            PointIdentity::Node(node) => {
                self.identity = PointIdentity::Expanded(namespaces.to_expanded(node)?);
            }
        }
        Ok(())
    }

    /// Resolves the node id the server should monitor.
    pub fn resolve_node_id(&self, namespaces: &NamespaceResolver) -> Result<NodeId, NamespaceError> {
        match &self.identity {
            PointIdentity::Node(node) => Ok(node.clone()),
            PointIdentity::Expanded(id) => namespaces.to_node_id(id),
        }
    }

    /// Records a successful activation on the server.
    pub fn mark_monitored(&mut self, handle: MonitoredItemHandle, display_name: String) {
        self.state = PointState::Monitored;
        self.revised_sampling_interval = Some(handle.revised_sampling_interval);
        self.handle = Some(handle);
        self.display_name = Some(display_name);
    }

    /// Revokes the activation after the session was lost.
    pub fn revoke(&mut self) {
        self.handle = None;
        self.revised_sampling_interval = None;
        if self.state == PointState::Monitored {
            self.state = PointState::Unmonitored;
        }
    }

    /// Tags the point for removal.
    pub fn request_removal(&mut self) {
        self.state = PointState::RemovalRequested;
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Returns `true` if this point is the node named by either candidate.
    ///
    /// Callers pass the candidate in the form it was requested and, when the
    /// namespace table allows, in the other form as well.
    pub fn matches(
        &self,
        node: Option<&NodeId>,
        expanded: Option<&ExpandedNodeId>,
        namespaces: &NamespaceResolver,
    ) -> bool {
        if self.state.is_removal_requested() {
            return false;
        }

        match &self.identity {
            PointIdentity::Node(own) => {
                if node.is_some_and(|n| n == own) {
                    return true;
                }
                expanded.is_some_and(|candidate| {
                    let same_namespace = namespaces
                        .uri_of(own.namespace_index)
                        .zip(candidate.namespace_uri())
                        .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b));
                    same_namespace && own.identifier.eq_ignore_case(&candidate.identifier)
                })
            }
            PointIdentity::Expanded(own) => {
                let by_index = node.is_some_and(|candidate| {
                    let own_index = match own.namespace_uri() {
                        Some(uri) => namespaces.index_of(uri),
                        None => Some(own.namespace_index),
                    };
                    own_index == Some(candidate.namespace_index)
                        && own.identifier.eq_ignore_case(&candidate.identifier)
                });
                by_index
                    || expanded.is_some_and(|candidate| {
                        let same_namespace = match (own.namespace_uri(), candidate.namespace_uri()) {
                            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                            (None, None) => own.namespace_index == candidate.namespace_index,
                            _ => false,
                        };
                        same_namespace && own.identifier.eq_ignore_case(&candidate.identifier)
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeIdentifier;

    const ACME: &str = "http://acme.com/UA";

    fn namespaces() -> NamespaceResolver {
        NamespaceResolver::from_uris(["http://opcfoundation.org/UA/", "urn:local", ACME])
    }

    fn handle() -> MonitoredItemHandle {
        MonitoredItemHandle {
            client_handle: 1,
            revised_sampling_interval: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_initial_state_depends_on_form() {
        let by_index = MonitoredPoint::new(NodeId::numeric(2, 1001).into(), PointSettings::default());
        assert_eq!(by_index.state(), PointState::Unmonitored);

        let by_uri = MonitoredPoint::new(
            ExpandedNodeId::with_uri(ACME, NodeIdentifier::Numeric(1001)).into(),
            PointSettings::default(),
        );
        assert_eq!(by_uri.state(), PointState::UnmonitoredPendingNamespaceUpdate);
        assert!(by_uri.state().needs_activation());
    }

    #[test]
    fn test_normalize_resolves_index() {
        let mut point = MonitoredPoint::new(
            ExpandedNodeId::with_uri(ACME, NodeIdentifier::String("Speed".into())).into(),
            PointSettings::default(),
        );
        point.normalize_namespace(&namespaces()).unwrap();
        assert_eq!(point.state(), PointState::Unmonitored);
        assert_eq!(point.resolve_node_id(&namespaces()).unwrap(), NodeId::string(2, "Speed"));
        assert_eq!(point.configured_identity().to_string(), "nsu=http://acme.com/UA;s=Speed");
    }

    #[test]
    fn test_normalize_unknown_uri_drops_to_unmonitored() {
        let mut point = MonitoredPoint::new(
            ExpandedNodeId::with_uri("urn:nowhere", NodeIdentifier::Numeric(1)).into(),
            PointSettings::default(),
        );
        assert!(point.normalize_namespace(&namespaces()).is_err());
        assert_eq!(point.state(), PointState::Unmonitored);
        assert!(point.resolve_node_id(&namespaces()).is_err());
    }

    #[test]
    fn test_state_transitions() {
        let mut point = MonitoredPoint::new(NodeId::numeric(2, 1).into(), PointSettings::default());
        point.mark_monitored(handle(), "ns=2;i=1".into());
        assert!(point.state().is_monitored());
        assert_eq!(point.revised_sampling_interval(), Some(Duration::from_millis(250)));

        point.revoke();
        assert_eq!(point.state(), PointState::Unmonitored);
        assert!(point.handle().is_none());

        point.request_removal();
        point.revoke();
        assert_eq!(point.state(), PointState::RemovalRequested);
    }

    #[test]
    fn test_index_point_matches_uri_candidate() {
        let ns = namespaces();
        let point = MonitoredPoint::new(NodeId::string(2, "Line1.Temp").into(), PointSettings::default());

        let candidate = ExpandedNodeId::with_uri(ACME, NodeIdentifier::String("line1.temp".into()));
        assert!(point.matches(None, Some(&candidate), &ns));

        let other = ExpandedNodeId::with_uri("urn:local", NodeIdentifier::String("Line1.Temp".into()));
        assert!(!point.matches(None, Some(&other), &ns));

        assert!(point.matches(Some(&NodeId::string(2, "Line1.Temp")), None, &ns));
        assert!(!point.matches(Some(&NodeId::string(1, "Line1.Temp")), None, &ns));
    }

    #[test]
    fn test_uri_point_matches_index_candidate() {
        let ns = namespaces();
        let point = MonitoredPoint::new(
            ExpandedNodeId::with_uri(ACME, NodeIdentifier::Numeric(1001)).into(),
            PointSettings::default(),
        );

        assert!(point.matches(Some(&NodeId::numeric(2, 1001)), None, &ns));
        assert!(!point.matches(Some(&NodeId::numeric(1, 1001)), None, &ns));

        let same = ExpandedNodeId::with_uri(ACME, NodeIdentifier::Numeric(1001));
        assert!(point.matches(None, Some(&same), &NamespaceResolver::new()));
    }

    #[test]
    fn test_namespace_uri_compare_ignores_case() {
        let ns = namespaces();
        let point = MonitoredPoint::new(
            ExpandedNodeId::with_uri(ACME, NodeIdentifier::Numeric(1001)).into(),
            PointSettings::default(),
        );
        let upper = ExpandedNodeId::with_uri("HTTP://ACME.COM/UA", NodeIdentifier::Numeric(1001));
        assert!(point.matches(None, Some(&upper), &NamespaceResolver::new()));

        let by_index = MonitoredPoint::new(NodeId::numeric(2, 7).into(), PointSettings::default());
        let mixed = ExpandedNodeId::with_uri("http://Acme.com/ua", NodeIdentifier::Numeric(7));
        assert!(by_index.matches(None, Some(&mixed), &ns));

        let elsewhere = ExpandedNodeId::with_uri("http://acme.com/UA2", NodeIdentifier::Numeric(7));
        assert!(!by_index.matches(None, Some(&elsewhere), &ns));
    }

    #[test]
    fn test_removal_requested_never_matches() {
        let ns = namespaces();
        let mut point = MonitoredPoint::new(NodeId::numeric(2, 5).into(), PointSettings::default());
        point.request_removal();
        assert!(!point.matches(Some(&NodeId::numeric(2, 5)), None, &ns));
    }
}
