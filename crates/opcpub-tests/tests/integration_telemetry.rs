// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Telemetry Integration Tests
//!
//! Integration tests for telemetry records produced by live notifications:
//!
//! - Field selection
//! - Configured identity and display name fallback
//! - Application URI with a shopfloor domain

use chrono::{TimeZone, Utc};
use opcpub_config::TelemetryConfig;
use opcpub_opcua::{OpcUaValue, StatusCode};
use opcpub_tests::prelude::*;

async fn harness_with(name: &str, settings: opcpub_opcua::EngineSettings) -> TestHarness {
    let harness = TestHarness::with_settings(name, settings);
    harness
        .add(Endpoints::plc(), Points::numeric(1001), None, None)
        .await;
    harness.settle().await;
    assert_eq!(harness.transport.active_item_count(), 1);
    harness
}

#[tokio::test]
async fn test_record_default_fields() {
    let mut harness = harness_with(
        "record_default_fields",
        SettingsBuilder::new().build(),
    )
    .await;

    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let notification = NotificationBuilder::double(21.5).source_timestamp(ts).build();
    assert_eq!(harness.transport.push_notification(&Points::node(1001), notification), 1);

    let record = harness.next_record().await;
    record.assert_node("ns=2;i=1001");
    record.assert_value("21.5");
    assert_eq!(record.endpoint_url.as_deref(), Some(Endpoints::plc()));
    assert_eq!(record.application_uri.as_deref(), Some("urn:mock:server"));
    assert_eq!(record.display_name.as_deref(), Some("ns=2;i=1001"));
    assert_eq!(record.source_timestamp, Some(ts.to_rfc3339()));
    assert!(record.status_code.is_none());
    assert!(record.status.is_none());
    assert!(!record.preserve_value_quotes);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_record_minimal_fields() {
    let telemetry = TelemetryConfig {
        endpoint_url: false,
        application_uri: false,
        display_name: false,
        source_timestamp: false,
        ..TelemetryConfig::default()
    };
    let mut harness = harness_with(
        "record_minimal_fields",
        SettingsBuilder::new().telemetry(telemetry).build(),
    )
    .await;

    harness
        .transport
        .push_value(&Points::node(1001), OpcUaValue::Int32(7));

    let record = harness.next_record().await;
    record.assert_minimal();
    record.assert_value("7");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_record_node_id_and_value_always_present() {
    let telemetry = TelemetryConfig {
        node_id: false,
        value: false,
        ..TelemetryConfig::default()
    };
    let mut harness = harness_with(
        "record_node_id_and_value_always_present",
        SettingsBuilder::new().telemetry(telemetry).build(),
    )
    .await;

    harness
        .transport
        .push_value(&Points::node(1001), OpcUaValue::Boolean(true));

    let record = harness.next_record().await;
    record.assert_node("ns=2;i=1001");
    record.assert_value("true");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_record_status_and_domain() {
    let telemetry = TelemetryConfig {
        status_code: true,
        status: true,
        shopfloor_domain: Some("plant-7".to_string()),
        ..TelemetryConfig::default()
    };
    let mut harness = harness_with(
        "record_status_and_domain",
        SettingsBuilder::new().telemetry(telemetry).build(),
    )
    .await;

    let notification = NotificationBuilder::double(0.0)
        .status(StatusCode::UNCERTAIN)
        .build();
    harness
        .transport
        .push_notification(&Points::node(1001), notification);

    let record = harness.next_record().await;
    assert_eq!(record.application_uri.as_deref(), Some("urn:mock:server:plant-7"));
    assert_eq!(record.status_code, Some(StatusCode::UNCERTAIN.0));
    assert_eq!(record.status.as_deref(), Some("Uncertain"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_record_string_value_keeps_quotes_flag() {
    let mut harness = harness_with(
        "record_string_value_keeps_quotes_flag",
        SettingsBuilder::new().build(),
    )
    .await;

    harness.transport.push_notification(
        &Points::node(1001),
        NotificationBuilder::string("RUNNING").build(),
    );

    let record = harness.next_record().await;
    record.assert_value("RUNNING");
    assert!(record.preserve_value_quotes);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_record_uses_configured_identity_and_display_name() {
    let display_name = "Boiler Temperature";
    let settings = SettingsBuilder::new().fetch_display_name().build();
    let mut harness = TestHarness::with_settings("record_uses_configured_identity", settings);
    harness
        .transport
        .set_display_name(&Points::node(5), display_name);
    harness.transport.set_application_uri(None);

    harness
        .add(Endpoints::plc(), Points::acme_numeric(5), None, None)
        .await;
    harness.settle().await;

    assert_eq!(
        harness
            .transport
            .push_value(&Points::node(5), OpcUaValue::Double(80.25)),
        1
    );

    let record = harness.next_record().await;
    record.assert_node(&format!("nsu={};i=5", Namespaces::ACME));
    assert_eq!(record.display_name.as_deref(), Some(display_name));
    assert!(record.application_uri.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_no_records_after_removal() {
    let mut harness = harness_with("no_records_after_removal", SettingsBuilder::new().build()).await;

    harness.remove(Endpoints::plc(), &Points::numeric(1001)).await;
    harness.settle().await;

    assert_eq!(
        harness
            .transport
            .push_value(&Points::node(1001), OpcUaValue::Double(1.0)),
        0
    );
    assert!(harness.drain_records().is_empty());
    assert_eq!(harness.dropped_records(), 0);

    harness.shutdown().await;
}
