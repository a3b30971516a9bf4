// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Point groups.
//!
//! A [`PointGroup`] is the local side of one server subscription: every
//! point in it shares the same requested publishing interval. A session owns
//! its groups through [`PointGroups`], which keeps at most one group per
//! interval.
//!
//! ```text
//! ┌──────────────────────── ConnectionSession ────────────────────────┐
//! │  PointGroups                                                     │
//! │  ┌───────────────────┐  ┌───────────────────┐                    │
//! │  │ PointGroup 1000ms │  │ PointGroup 5000ms │                    │
//! │  │ remote: sub-12    │  │ remote: None      │  (created lazily)  │
//! │  │ [P1, P2, P3]      │  │ [P4]              │                    │
//! │  └───────────────────┘  └───────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ExpandedNodeId, NodeId};

use super::item::MonitoredPoint;
use super::namespace::NamespaceResolver;
use super::transport::RemoteSubscription;

// =============================================================================
// IDs
// =============================================================================

/// Server-assigned identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u32);

impl SubscriptionId {
    /// Creates a new subscription ID.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl From<u32> for SubscriptionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// =============================================================================
// PointGroup
// =============================================================================

/// Points sharing one publishing interval.
pub struct PointGroup {
    requested_publishing_interval: Duration,
    revised_publishing_interval: Option<Duration>,
    points: Vec<MonitoredPoint>,
    remote: Option<Arc<dyn RemoteSubscription>>,
}

impl PointGroup {
    /// Creates an empty group with no remote subscription.
    pub fn new(requested_publishing_interval: Duration) -> Self {
        Self {
            requested_publishing_interval,
            revised_publishing_interval: None,
            points: Vec::new(),
            remote: None,
        }
    }

    /// Publishing interval the group is keyed by.
    pub fn requested_publishing_interval(&self) -> Duration {
        self.requested_publishing_interval
    }

    /// Publishing interval revised by the server, once created remotely.
    pub fn revised_publishing_interval(&self) -> Option<Duration> {
        self.revised_publishing_interval
    }

    /// Points in the group.
    pub fn points(&self) -> &[MonitoredPoint] {
        &self.points
    }

    /// Mutable access to the points in the group.
    pub fn points_mut(&mut self) -> &mut [MonitoredPoint] {
        &mut self.points
    }

    /// Appends a point.
    pub fn push(&mut self, point: MonitoredPoint) {
        self.points.push(point);
    }

    /// Number of points in the group.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the group holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points active on the server.
    pub fn monitored_count(&self) -> usize {
        self.points.iter().filter(|p| p.state().is_monitored()).count()
    }

    /// Returns `true` if some point still waits for activation.
    pub fn has_pending_additions(&self) -> bool {
        self.points.iter().any(|p| p.state().needs_activation())
    }

    /// The remote subscription, if it has been created.
    pub fn remote(&self) -> Option<&Arc<dyn RemoteSubscription>> {
        self.remote.as_ref()
    }

    /// Records the remote subscription created for this group.
    pub fn attach(&mut self, subscription: Arc<dyn RemoteSubscription>) {
        self.revised_publishing_interval = Some(subscription.revised_publishing_interval());
        self.remote = Some(subscription);
    }

    /// Clears the remote subscription, returning it for teardown.
    pub fn detach(&mut self) -> Option<Arc<dyn RemoteSubscription>> {
        self.revised_publishing_interval = None;
        self.remote.take()
    }

    /// Demotes every monitored point after the session was lost.
    pub fn revoke_all(&mut self) {
        self.points.iter_mut().for_each(MonitoredPoint::revoke);
    }

    /// Removes and returns the points tagged for removal.
    pub fn take_removal_requested(&mut self) -> Vec<MonitoredPoint> {
        let (removed, kept) = std::mem::take(&mut self.points)
            .into_iter()
            .partition(|p| p.state().is_removal_requested());
        self.points = kept;
        removed
    }

    /// Returns `true` if a point in this group matches either candidate.
    pub fn contains(
        &self,
        node: Option<&NodeId>,
        expanded: Option<&ExpandedNodeId>,
        namespaces: &NamespaceResolver,
    ) -> bool {
        self.points.iter().any(|p| p.matches(node, expanded, namespaces))
    }
}

impl fmt::Debug for PointGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointGroup")
            .field("requested_publishing_interval", &self.requested_publishing_interval)
            .field("revised_publishing_interval", &self.revised_publishing_interval)
            .field("points", &self.points.len())
            .field("remote", &self.remote.as_ref().map(|s| s.id()))
            .finish()
    }
}

// =============================================================================
// PointGroups
// =============================================================================

/// The groups owned by one session, at most one per requested interval.
#[derive(Debug, Default)]
pub struct PointGroups {
    groups: Vec<PointGroup>,
}

impl PointGroups {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the group for `interval`, creating it if absent.
    pub fn ensure_group_for_interval(&mut self, interval: Duration) -> &mut PointGroup {
        let index = match self
            .groups
            .iter()
            .position(|g| g.requested_publishing_interval == interval)
        {
            Some(index) => index,
            None => {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "Creating point group");
                self.groups.push(PointGroup::new(interval));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Returns the group keyed by `interval`.
    pub fn find(&self, interval: Duration) -> Option<&PointGroup> {
        self.groups
            .iter()
            .find(|g| g.requested_publishing_interval == interval)
    }

    /// Iterates over the groups.
    pub fn iter(&self) -> impl Iterator<Item = &PointGroup> {
        self.groups.iter()
    }

    /// Iterates mutably over the groups.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PointGroup> {
        self.groups.iter_mut()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of points across all groups.
    pub fn point_count(&self) -> usize {
        self.groups.iter().map(PointGroup::len).sum()
    }

    /// Number of points active on the server across all groups.
    pub fn monitored_count(&self) -> usize {
        self.groups.iter().map(PointGroup::monitored_count).sum()
    }

    /// Returns `true` if any group holds a point matching either candidate.
    pub fn is_published(
        &self,
        node: Option<&NodeId>,
        expanded: Option<&ExpandedNodeId>,
        namespaces: &NamespaceResolver,
    ) -> bool {
        self.groups.iter().any(|g| g.contains(node, expanded, namespaces))
    }

    /// Tags every matching point for removal; returns how many were tagged.
    pub fn request_removal(
        &mut self,
        node: Option<&NodeId>,
        expanded: Option<&ExpandedNodeId>,
        namespaces: &NamespaceResolver,
    ) -> usize {
        let mut tagged = 0;
        for point in self.groups.iter_mut().flat_map(|g| g.points.iter_mut()) {
            if point.matches(node, expanded, namespaces) {
                point.request_removal();
                tagged += 1;
            }
        }
        tagged
    }

    /// Removes and returns the groups that hold no points.
    pub fn take_empty(&mut self) -> Vec<PointGroup> {
        let (empty, kept) = std::mem::take(&mut self.groups)
            .into_iter()
            .partition(PointGroup::is_empty);
        self.groups = kept;
        empty
    }

    /// Removes every group.
    pub fn drain(&mut self) -> Vec<PointGroup> {
        std::mem::take(&mut self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::item::{PointSettings, PointState};

    fn point(id: u32) -> MonitoredPoint {
        MonitoredPoint::new(NodeId::numeric(2, id).into(), PointSettings::default())
    }

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId::new(42).to_string(), "sub-42");
        assert_eq!(SubscriptionId::from(7).value(), 7);
    }

    #[test]
    fn test_one_group_per_interval() {
        let mut groups = PointGroups::new();
        groups.ensure_group_for_interval(Duration::from_millis(1000)).push(point(1));
        groups.ensure_group_for_interval(Duration::from_millis(1000)).push(point(2));
        groups.ensure_group_for_interval(Duration::from_millis(5000)).push(point(3));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups.point_count(), 3);
        assert_eq!(groups.find(Duration::from_millis(1000)).map(PointGroup::len), Some(2));
    }

    #[test]
    fn test_take_removal_requested() {
        let mut group = PointGroup::new(Duration::from_millis(500));
        group.push(point(1));
        group.push(point(2));
        group.points_mut()[0].request_removal();

        let removed = group.take_removal_requested();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].state(), PointState::RemovalRequested);
        assert_eq!(group.len(), 1);
        assert!(group.has_pending_additions());
    }

    #[test]
    fn test_request_removal_and_take_empty() {
        let ns = NamespaceResolver::new();
        let mut groups = PointGroups::new();
        groups.ensure_group_for_interval(Duration::from_millis(1000)).push(point(1));
        groups.ensure_group_for_interval(Duration::from_millis(2000)).push(point(2));

        let target = NodeId::numeric(2, 1);
        assert!(groups.is_published(Some(&target), None, &ns));
        assert_eq!(groups.request_removal(Some(&target), None, &ns), 1);
        assert!(!groups.is_published(Some(&target), None, &ns));
        assert_eq!(groups.request_removal(Some(&target), None, &ns), 0);

        for group in groups.iter_mut() {
            group.take_removal_requested();
        }
        let empty = groups.take_empty();
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].requested_publishing_interval(), Duration::from_millis(1000));
        assert_eq!(groups.len(), 1);
    }
}
