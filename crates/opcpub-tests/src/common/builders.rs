// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Builder patterns for constructing engine settings and notifications with
//! sensible test defaults.
//!
//! ## Design Principles
//!
//! - Sensible defaults for common test scenarios
//! - Chainable methods for fluent API

use std::time::Duration;

use chrono::{DateTime, Utc};
use opcpub_config::TelemetryConfig;
use opcpub_opcua::{DataChangeNotification, EngineSettings, OpcUaValue, StatusCode};

// =============================================================================
// EngineSettings Builder
// =============================================================================

/// Builder for [`EngineSettings`] tuned for tests.
///
/// The periodic ticker is effectively disabled so that only explicit
/// requests trigger passes.
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    settings: EngineSettings,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    /// Creates a builder with test defaults.
    pub fn new() -> Self {
        Self {
            settings: EngineSettings {
                application_name: "opcpub-tests".to_string(),
                session_timeout: Duration::from_secs(5),
                keep_alive_disconnect_threshold: 3,
                use_security: false,
                reconcile_interval: Duration::from_secs(3600),
                ..EngineSettings::default()
            },
        }
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.settings.session_timeout = timeout;
        self
    }

    /// Sets the connect backoff cap.
    pub fn creation_backoff_max(mut self, max: u32) -> Self {
        self.settings.creation_backoff_max = max;
        self
    }

    /// Sets the keep-alive threshold.
    pub fn keep_alive_threshold(mut self, threshold: u32) -> Self {
        self.settings.keep_alive_disconnect_threshold = threshold;
        self
    }

    /// Enables display name reads.
    pub fn fetch_display_name(mut self) -> Self {
        self.settings.fetch_display_name = true;
        self
    }

    /// Sets the default publishing interval.
    pub fn default_publishing_interval(mut self, interval: Duration) -> Self {
        self.settings.default_publishing_interval = interval;
        self
    }

    /// Sets the reconcile period.
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.settings.reconcile_interval = interval;
        self
    }

    /// Sets the pass concurrency.
    pub fn max_concurrent_passes(mut self, passes: usize) -> Self {
        self.settings.max_concurrent_passes = passes;
        self
    }

    /// Disables configuration-changed events.
    pub fn no_configuration_updates(mut self) -> Self {
        self.settings.update_configuration = false;
        self
    }

    /// Sets the telemetry field selection.
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.settings.telemetry = telemetry;
        self
    }

    /// Builds the settings.
    pub fn build(self) -> EngineSettings {
        self.settings
    }
}

// =============================================================================
// Notification Builder
// =============================================================================

/// Builder for [`DataChangeNotification`] instances.
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    value: OpcUaValue,
    status: StatusCode,
    source_timestamp: Option<DateTime<Utc>>,
}

impl NotificationBuilder {
    /// Creates a good notification carrying `value`.
    pub fn new(value: OpcUaValue) -> Self {
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
        }
    }

    /// Sets a double value.
    pub fn double(v: f64) -> Self {
        Self::new(OpcUaValue::Double(v))
    }

    /// Sets a string value.
    pub fn string(v: &str) -> Self {
        Self::new(OpcUaValue::String(v.to_string()))
    }

    /// Sets the status.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the source timestamp.
    pub fn source_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(ts);
        self
    }

    /// Builds the notification.
    pub fn build(self) -> DataChangeNotification {
        DataChangeNotification {
            value: self.value,
            status: self.status,
            source_timestamp: self.source_timestamp,
            server_timestamp: Some(Utc::now()),
        }
    }
}
