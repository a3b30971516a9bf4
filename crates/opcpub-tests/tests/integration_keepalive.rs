// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Keep-alive Integration Tests
//!
//! Integration tests for keep-alive supervision including:
//!
//! - Counting of bad keep-alives and reset on a good one
//! - Disconnect at the threshold and revocation of active points
//! - Reconnect on the next pass without duplicated items

use std::sync::Arc;
use std::time::Duration;

use opcpub_opcua::{ConnectionSession, PointState, SessionState, StatusCode};
use opcpub_tests::prelude::*;

const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

async fn wait_missed(session: &Arc<ConnectionSession>, expected: u32) {
    let session = Arc::clone(session);
    wait_for_or_panic(WAIT, POLL, "missed keep-alive count", move || {
        let session = Arc::clone(&session);
        async move { session.missed_keep_alives().await == expected }
    })
    .await;
}

async fn wait_state(session: &Arc<ConnectionSession>, expected: SessionState) {
    let session = Arc::clone(session);
    wait_for_or_panic(WAIT, POLL, "session state", move || {
        let session = Arc::clone(&session);
        async move { session.state().await == expected }
    })
    .await;
}

async fn connected_harness(name: &str, threshold: u32) -> (TestHarness, Arc<ConnectionSession>) {
    let settings = SettingsBuilder::new().keep_alive_threshold(threshold).build();
    let harness = TestHarness::with_settings(name, settings);
    for point in Points::numeric_batch(1, 3) {
        harness.add(Endpoints::plc(), point, None, None).await;
    }
    harness.settle().await;

    let session = harness.session(Endpoints::plc()).await;
    assert_session_state(&session, SessionState::Connected).await;
    assert_eq!(harness.transport.active_item_count(), 3);
    (harness, session)
}

#[tokio::test]
async fn test_bad_keep_alives_below_threshold() {
    let (harness, session) = connected_harness("bad_keep_alives_below_threshold", 3).await;

    assert_eq!(harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT), 1);
    assert_eq!(harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT), 1);
    wait_missed(&session, 2).await;

    assert_session_state(&session, SessionState::Connected).await;
    assert_point_states(&session, &Points::numeric(1), PointState::Monitored, 1).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_good_keep_alive_resets_count() {
    let (harness, session) = connected_harness("good_keep_alive_resets_count", 3).await;

    harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    wait_missed(&session, 2).await;

    harness.transport.fire_keep_alive(StatusCode::GOOD);
    wait_missed(&session, 0).await;

    harness.transport.fire_keep_alive(StatusCode::BAD_COMMUNICATION_ERROR);
    harness.transport.fire_keep_alive(StatusCode::BAD_COMMUNICATION_ERROR);
    wait_missed(&session, 2).await;
    assert_session_state(&session, SessionState::Connected).await;
    assert_eq!(session.stats().keep_alive_disconnects(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_threshold_disconnects_and_revokes() {
    let (harness, session) = connected_harness("threshold_disconnects_and_revokes", 3).await;

    for _ in 0..3 {
        harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    }
    wait_state(&session, SessionState::Disconnected).await;

    assert_eq!(session.stats().keep_alive_disconnects(), 1);
    assert_eq!(session.missed_keep_alives().await, 0);
    for point in Points::numeric_batch(1, 3) {
        assert_point_states(&session, &point, PointState::Unmonitored, 1).await;
    }
    assert_eq!(session.monitored_item_count().await, 0);
    // Groups survive the disconnect.
    assert_eq!(session.subscription_count().await, 1);

    assert_eq!(harness.transport.live_session_count(), 0);
    assert_eq!(harness.transport.live_subscription_count(), 0);
    assert_eq!(harness.transport.keep_alive_handler_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_after_keep_alive_loss() {
    let (harness, session) = connected_harness("reconnect_after_keep_alive_loss", 2).await;

    harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    wait_state(&session, SessionState::Disconnected).await;

    let reports = harness.pass().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].connected);
    assert_eq!(reports[0].added, 3);

    let mut active = harness.transport.active_items();
    active.sort_by_key(|node| node.to_string());
    let mut expected: Vec<_> = (1..=3).map(Points::node).collect();
    expected.sort_by_key(|node| node.to_string());
    assert_eq!(active, expected);

    assert_eq!(harness.transport.live_session_count(), 1);
    assert_eq!(harness.transport.live_subscription_count(), 1);
    assert_eq!(harness.transport.keep_alive_handler_count(), 1);
    assert_eq!(harness.registry.get_monitored_item_count().await, 3);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_keep_alive_after_disconnect_is_ignored() {
    let (harness, session) = connected_harness("keep_alive_after_disconnect_is_ignored", 1).await;

    harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT);
    wait_state(&session, SessionState::Disconnected).await;

    // The handler is gone with the session.
    assert_eq!(harness.transport.fire_keep_alive(StatusCode::BAD_TIMEOUT), 0);
    assert_eq!(session.stats().keep_alive_disconnects(), 1);

    harness.shutdown().await;
}
