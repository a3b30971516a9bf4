// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Telemetry record assembly.
//!
//! Every data change of a monitored item becomes one [`MessageData`]
//! record. The node identity and the value are always filled; every other
//! field is filled only when its publish flag is set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opcpub_config::TelemetryConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::client::DataChangeNotification;
use crate::types::PointIdentity;

// =============================================================================
// MessageData
// =============================================================================

/// One telemetry record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Endpoint the value came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Identity of the point as it was configured.
    pub node_id: String,

    /// Application URI of the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// Display name of the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// JSON rendering of the value; strings are stored without quotes.
    pub value: String,

    /// ISO 8601 source timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<String>,

    /// Raw status code of the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u32>,

    /// Symbolic name of the status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// The value was a JSON string and must be re-quoted downstream.
    pub preserve_value_quotes: bool,
}

// =============================================================================
// TelemetryContext
// =============================================================================

/// Per-item context captured when the item is activated.
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    endpoint_url: String,
    node_id: String,
    application_uri: Option<String>,
    display_name: String,
    config: Arc<TelemetryConfig>,
}

impl TelemetryContext {
    /// Creates the context for one monitored item.
    pub fn new(
        endpoint_url: impl Into<String>,
        configured: &PointIdentity,
        application_uri: Option<String>,
        display_name: impl Into<String>,
        config: Arc<TelemetryConfig>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            node_id: configured.to_string(),
            application_uri,
            display_name: display_name.into(),
            config,
        }
    }

    /// Builds the record for one notification.
    pub fn assemble(&self, notification: &DataChangeNotification) -> MessageData {
        let config = &self.config;
        let mut record = MessageData {
            node_id: self.node_id.clone(),
            ..MessageData::default()
        };

        if config.endpoint_url {
            record.endpoint_url = Some(self.endpoint_url.clone());
        }
        if config.application_uri {
            record.application_uri = self.application_uri.as_ref().map(|uri| {
                match config.shopfloor_domain.as_deref().filter(|d| !d.is_empty()) {
                    Some(domain) => format!("{uri}:{domain}"),
                    None => uri.clone(),
                }
            });
        }
        if config.display_name {
            record.display_name = Some(self.display_name.clone());
        }
        if config.source_timestamp {
            record.source_timestamp = notification.source_timestamp.map(|ts| ts.to_rfc3339());
        }
        if config.status_code {
            record.status_code = Some(notification.status.0);
        }
        if config.status {
            record.status = Some(notification.status.name().to_string());
        }

        match notification.value.to_json() {
            serde_json::Value::String(s) => {
                record.value = s;
                record.preserve_value_quotes = true;
            }
            other => record.value = other.to_string(),
        }

        record
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination for assembled records.
///
/// Called from notification callbacks, so implementations must not block.
pub trait TelemetrySink: Send + Sync {
    /// Hands over one record.
    fn publish(&self, record: MessageData);
}

/// Sink that forwards records into a bounded tokio channel.
///
/// Records are dropped when the channel is full or closed.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<MessageData>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MessageData>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of records dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelSink {
    fn publish(&self, record: MessageData) {
        if let Err(e) = self.tx.try_send(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(error = %e, "Telemetry record dropped");
        }
    }
}

/// Sink that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl TelemetrySink for DiscardSink {
    fn publish(&self, _record: MessageData) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::types::{NodeId, OpcUaValue};
    use chrono::{TimeZone, Utc};

    fn context(config: TelemetryConfig) -> TelemetryContext {
        TelemetryContext::new(
            "opc.tcp://plc:4840",
            &PointIdentity::from(NodeId::string(2, "Temp")),
            Some("urn:plc".to_string()),
            "Temperature",
            Arc::new(config),
        )
    }

    #[test]
    fn test_default_fields() {
        let mut n = DataChangeNotification::good(OpcUaValue::Double(21.5));
        n.source_timestamp = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let record = context(TelemetryConfig::default()).assemble(&n);
        assert_eq!(record.endpoint_url.as_deref(), Some("opc.tcp://plc:4840"));
        assert_eq!(record.node_id, "ns=2;s=Temp");
        assert_eq!(record.application_uri.as_deref(), Some("urn:plc"));
        assert_eq!(record.display_name.as_deref(), Some("Temperature"));
        assert_eq!(record.value, "21.5");
        assert!(!record.preserve_value_quotes);
        assert_eq!(
            record.source_timestamp.as_deref(),
            Some("2024-05-01T12:00:00+00:00")
        );
        assert_eq!(record.status_code, None);
        assert_eq!(record.status, None);
    }

    #[test]
    fn test_node_id_and_value_ignore_flags() {
        let config = TelemetryConfig {
            endpoint_url: false,
            node_id: false,
            application_uri: false,
            display_name: false,
            value: false,
            source_timestamp: false,
            ..TelemetryConfig::default()
        };
        let record = context(config).assemble(&DataChangeNotification::good(OpcUaValue::Int32(7)));
        assert_eq!(record.node_id, "ns=2;s=Temp");
        assert_eq!(record.value, "7");
        assert_eq!(record.endpoint_url, None);
        assert_eq!(record.application_uri, None);
        assert_eq!(record.display_name, None);
        assert_eq!(record.source_timestamp, None);
    }

    #[test]
    fn test_string_value_and_status() {
        let config = TelemetryConfig {
            status_code: true,
            status: true,
            shopfloor_domain: Some("plant-7".to_string()),
            ..TelemetryConfig::default()
        };
        let mut n = DataChangeNotification::good(OpcUaValue::String("running".into()));
        n.status = StatusCode::UNCERTAIN;

        let record = context(config).assemble(&n);
        assert_eq!(record.value, "running");
        assert!(record.preserve_value_quotes);
        assert_eq!(record.application_uri.as_deref(), Some("urn:plc:plant-7"));
        assert_eq!(record.status_code, Some(0x4000_0000));
        assert_eq!(record.status.as_deref(), Some(StatusCode::UNCERTAIN.name()));
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.publish(MessageData::default());
        sink.publish(MessageData::default());
        assert_eq!(sink.dropped(), 1);
        assert!(rx.recv().await.is_some());
    }
}
