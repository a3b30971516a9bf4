// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process-wide session registry.
//!
//! The registry keeps one [`ConnectionSession`] per endpoint. Its own guard
//! only protects the session list; work on a session takes that session's
//! guard, so a slow endpoint never stalls the others.
//!
//! Lock order is always registry, then session, and the registry guard is
//! never held across a session await. Pruning only try-locks a session.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{AddOutcome, ConnectionSession, OpcUaTransport};
use crate::reconcile::{ReconcileRequest, ReconcileScheduler};
use crate::settings::EngineSettings;
use crate::telemetry::TelemetrySink;
use crate::types::{humantime_serde, PointIdentity};

/// Attempts made when a session is pruned between lookup and add.
const ADD_ATTEMPTS: usize = 3;

// =============================================================================
// Desired-state snapshot
// =============================================================================

/// A point as it would be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedNode {
    /// Identity as configured.
    pub identity: PointIdentity,

    /// Requested publishing interval of the owning group.
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Requested sampling interval.
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,
}

/// All points of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEndpoint {
    /// Endpoint URL.
    pub endpoint_url: String,

    /// Whether secured endpoints are preferred.
    pub use_security: bool,

    /// Points under the endpoint.
    pub nodes: Vec<PublishedNode>,
}

// =============================================================================
// SessionRegistry
// =============================================================================

struct RegistryInner {
    sessions: Mutex<Vec<Arc<ConnectionSession>>>,
    transport: Arc<dyn OpcUaTransport>,
    settings: Arc<EngineSettings>,
    sink: Arc<dyn TelemetrySink>,
    scheduler: RwLock<Option<Weak<dyn ReconcileScheduler>>>,
    cancel: CancellationToken,
}

/// Collection of sessions, one per endpoint.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(
        transport: Arc<dyn OpcUaTransport>,
        settings: Arc<EngineSettings>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(Vec::new()),
                transport,
                settings,
                sink,
                scheduler: RwLock::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Engine settings shared with the sessions.
    pub fn settings(&self) -> &Arc<EngineSettings> {
        &self.inner.settings
    }

    /// Installs the scheduler notified after add and remove requests.
    pub fn set_scheduler(&self, scheduler: Weak<dyn ReconcileScheduler>) {
        *self.inner.scheduler.write() = Some(scheduler);
    }

    fn schedule(&self, request: ReconcileRequest) {
        let scheduler = self.inner.scheduler.read().as_ref().and_then(Weak::upgrade);
        match scheduler {
            Some(scheduler) => scheduler.schedule(request),
            None => tracing::trace!(?request, "No reconciliation loop attached"),
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Returns the session for `endpoint`, creating a disconnected one if
    /// none exists.
    pub async fn find_or_create_session(
        &self,
        endpoint: &str,
        use_security: bool,
        timeout: Duration,
    ) -> Arc<ConnectionSession> {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.retain(|s| !s.is_terminated());
        if let Some(session) = sessions
            .iter()
            .find(|s| same_endpoint(s.endpoint(), endpoint))
        {
            return Arc::clone(session);
        }

        let session = ConnectionSession::new(
            endpoint,
            use_security,
            timeout,
            Arc::clone(&self.inner.settings),
            Arc::clone(&self.inner.transport),
            Arc::clone(&self.inner.sink),
        );
        sessions.push(Arc::clone(&session));
        tracing::info!(
            endpoint,
            use_security,
            sessions = sessions.len(),
            "Created session"
        );
        session
    }

    /// Returns the session for `endpoint`, if any.
    pub async fn find_session(&self, endpoint: &str) -> Option<Arc<ConnectionSession>> {
        self.inner
            .sessions
            .lock()
            .await
            .iter()
            .find(|s| same_endpoint(s.endpoint(), endpoint))
            .cloned()
    }

    /// Snapshot of all sessions.
    pub async fn sessions(&self) -> Vec<Arc<ConnectionSession>> {
        self.inner.sessions.lock().await.clone()
    }

    /// Number of sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    /// Shuts down and drops every session without point groups.
    ///
    /// Sessions busy with a pass are skipped and looked at again next call.
    ///
    /// Returns the number of sessions dropped.
    pub async fn prune_empty_sessions(&self) -> usize {
        let retired = {
            let mut sessions = self.inner.sessions.lock().await;
            let mut retired = Vec::new();
            sessions.retain(|session| {
                if session.try_retire() {
                    retired.push(Arc::clone(session));
                    false
                } else {
                    !session.is_terminated()
                }
            });
            retired
        };

        for session in &retired {
            session.shutdown().await;
            tracing::info!(endpoint = %session.endpoint(), "Removed unused session");
        }
        retired.len()
    }

    /// Shuts every session down and clears the registry.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let sessions = std::mem::take(&mut *self.inner.sessions.lock().await);
        for session in &sessions {
            session.shutdown().await;
        }
        tracing::info!(sessions = sessions.len(), "Session registry shut down");
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Queues `identity` for monitoring on `endpoint` and schedules a pass
    /// for the session.
    pub async fn add_point_for_monitoring(
        &self,
        endpoint: &str,
        identity: PointIdentity,
        publishing_interval: Option<Duration>,
        sampling_interval: Option<Duration>,
    ) -> AddOutcome {
        let settings = &self.inner.settings;
        let mut outcome = AddOutcome::SessionClosed;

        for _ in 0..ADD_ATTEMPTS {
            let session = self
                .find_or_create_session(endpoint, settings.use_security, settings.session_timeout)
                .await;
            outcome = session
                .add_point(
                    identity.clone(),
                    publishing_interval,
                    sampling_interval,
                    &self.inner.cancel,
                )
                .await;
            if outcome != AddOutcome::SessionClosed {
                break;
            }
            tracing::debug!(endpoint, "Session was pruned during add, retrying");
        }

        if outcome == AddOutcome::Added {
            self.schedule(ReconcileRequest::Session(endpoint.to_string()));
        }
        outcome
    }

    /// Tags every point matching `identity` on `endpoint` for removal and
    /// schedules a pass for the session.
    ///
    /// Returns `true` if a point was found and tagged.
    pub async fn request_point_removal(&self, endpoint: &str, identity: &PointIdentity) -> bool {
        let Some(session) = self.find_session(endpoint).await else {
            tracing::debug!(endpoint, node = %identity, "No session for removal request");
            return false;
        };

        let tagged = session
            .request_point_removal(identity, &self.inner.cancel)
            .await;
        if tagged {
            self.schedule(ReconcileRequest::Session(endpoint.to_string()));
        }
        tagged
    }

    /// Returns `true` if a live point matching `identity` exists on
    /// `endpoint`. Lookup failures count as not published.
    pub async fn is_point_published(&self, identity: &PointIdentity, endpoint: &str) -> bool {
        let matching: Vec<_> = self
            .inner
            .sessions
            .lock()
            .await
            .iter()
            .filter(|s| same_endpoint(s.endpoint(), endpoint))
            .cloned()
            .collect();
        for session in matching {
            match session.is_published(identity).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    endpoint,
                    node = %identity,
                    error = %e,
                    "Publication lookup failed, treating node as unpublished"
                ),
            }
        }
        false
    }

    // =========================================================================
    // Counts
    // =========================================================================

    /// Number of point groups across all sessions.
    pub async fn get_subscription_count(&self) -> usize {
        let mut count = 0;
        for session in self.sessions().await {
            count += session.subscription_count().await;
        }
        count
    }

    /// Number of points active on servers across all sessions.
    pub async fn get_monitored_item_count(&self) -> usize {
        let mut count = 0;
        for session in self.sessions().await {
            count += session.monitored_item_count().await;
        }
        count
    }

    /// Desired state of every session.
    pub async fn snapshot(&self) -> Vec<PublishedEndpoint> {
        let mut endpoints = Vec::new();
        for session in self.sessions().await {
            endpoints.push(PublishedEndpoint {
                endpoint_url: session.endpoint().to_string(),
                use_security: session.use_security(),
                nodes: session.snapshot_nodes().await,
            });
        }
        endpoints
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Endpoint URLs compare case-insensitively, ignoring a trailing slash.
fn same_endpoint(a: &str, b: &str) -> bool {
    a.trim_end_matches('/')
        .eq_ignore_ascii_case(b.trim_end_matches('/'))
}

// =============================================================================
// Tests
// =============================================================================
