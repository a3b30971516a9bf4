// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Domain-specific assertion helpers for publisher integration tests.
//!
//! ## Design Principles
//!
//! - Provide clear, informative failure messages
//! - Support both synchronous and asynchronous assertions

use std::time::Duration;

use opcpub_opcua::{ConnectionSession, MessageData, PointIdentity, PointState, SessionState};

// =============================================================================
// MessageData Assertions
// =============================================================================

/// Assertion extensions for telemetry records.
pub trait RecordAssertions {
    /// Assert the configured node identity.
    fn assert_node(&self, expected: &str);

    /// Assert the rendered value.
    fn assert_value(&self, expected: &str);

    /// Assert that only the always-present fields are filled.
    fn assert_minimal(&self);
}

impl RecordAssertions for MessageData {
    fn assert_node(&self, expected: &str) {
        assert_eq!(
            self.node_id, expected,
            "Expected record for {}, got {:?}",
            expected, self
        );
    }

    fn assert_value(&self, expected: &str) {
        assert_eq!(
            self.value, expected,
            "Expected value {} for {}, got {:?}",
            expected, self.node_id, self.value
        );
    }

    fn assert_minimal(&self) {
        assert!(self.endpoint_url.is_none(), "endpoint_url set: {:?}", self);
        assert!(self.application_uri.is_none(), "application_uri set: {:?}", self);
        assert!(self.display_name.is_none(), "display_name set: {:?}", self);
        assert!(self.source_timestamp.is_none(), "source_timestamp set: {:?}", self);
        assert!(self.status_code.is_none(), "status_code set: {:?}", self);
        assert!(self.status.is_none(), "status set: {:?}", self);
        assert!(!self.node_id.is_empty(), "node_id missing: {:?}", self);
    }
}

// =============================================================================
// Session Assertions
// =============================================================================

/// Assert the connection state of a session.
pub async fn assert_session_state(session: &ConnectionSession, expected: SessionState) {
    let actual = session.state().await;
    assert_eq!(
        actual,
        expected,
        "Session {} expected {}, got {}",
        session.endpoint(),
        expected,
        actual
    );
}

/// Assert that every point matching `identity` is in `expected` state and
/// that exactly `count` such points exist.
pub async fn assert_point_states(
    session: &ConnectionSession,
    identity: &PointIdentity,
    expected: PointState,
    count: usize,
) {
    let states = session.point_states(identity).await;
    assert_eq!(
        states.len(),
        count,
        "Expected {} point(s) for {}, got {:?}",
        count,
        identity,
        states
    );
    assert!(
        states.iter().all(|s| *s == expected),
        "Expected all points for {} to be {}, got {:?}",
        identity,
        expected,
        states
    );
}

// =============================================================================
// Async Assertion Helpers
// =============================================================================

/// Wait for a condition to become true within a timeout.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    condition().await
}

/// Wait for a condition to become true, panicking if it doesn't.
pub async fn wait_for_or_panic<F, Fut>(
    timeout: Duration,
    interval: Duration,
    message: &str,
    condition: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    if !wait_for(timeout, interval, condition).await {
        panic!("Condition not met within {:?}: {}", timeout, message);
    }
}

// =============================================================================
// Macro Assertions
// =============================================================================

/// Assert that an async operation completes within a timeout.
#[macro_export]
macro_rules! assert_completes_within {
    ($timeout:expr, $future:expr) => {{
        match tokio::time::timeout($timeout, $future).await {
            Ok(result) => result,
            Err(_) => panic!("Operation did not complete within {:?}", $timeout),
        }
    }};
}
