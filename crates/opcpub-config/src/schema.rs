// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for the publisher.
//!
//! Every section and every field has a default, so an empty document is a
//! valid configuration.
//!
//! # Schema Structure
//!
//! ```text
//! PublisherConfig
//! ├── session: SessionConfig
//! ├── subscription: SubscriptionConfig
//! ├── reconcile: ReconcileConfig
//! ├── telemetry: TelemetryConfig
//! └── logging: LoggingConfig
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default session timeout in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Default cap on the connect timeout multiplier.
pub const DEFAULT_CREATION_BACKOFF_MAX: u32 = 5;

/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 2;

/// Default number of bad keep-alives tolerated before disconnecting.
pub const DEFAULT_KEEP_ALIVE_DISCONNECT_THRESHOLD: u32 = 5;

/// Default sampling interval in milliseconds.
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1000;

/// Default reconcile interval in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Default number of reconcile passes allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_PASSES: usize = 4;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for the publisher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Session establishment and keep-alive settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Subscription and monitored item defaults.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Reconciliation loop settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Telemetry record field selection.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PublisherConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.session.validate()?;
        self.subscription.validate()?;
        self.reconcile.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Session establishment and keep-alive settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout in seconds. Also the base connect timeout.
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// Maximum multiplier applied to the connect timeout after failures.
    #[serde(default = "default_creation_backoff_max")]
    pub creation_backoff_max: u32,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,

    /// Consecutive bad keep-alives before the session is dropped.
    #[serde(default = "default_keep_alive_threshold")]
    pub keep_alive_disconnect_threshold: u32,

    /// Prefer secured endpoints.
    #[serde(default = "default_enabled")]
    pub use_security: bool,

    /// Read each node's display name when it is activated.
    #[serde(default)]
    pub fetch_display_name: bool,
}

fn default_session_timeout() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_creation_backoff_max() -> u32 {
    DEFAULT_CREATION_BACKOFF_MAX
}

fn default_keep_alive_interval() -> u64 {
    DEFAULT_KEEP_ALIVE_INTERVAL_SECS
}

fn default_keep_alive_threshold() -> u32 {
    DEFAULT_KEEP_ALIVE_DISCONNECT_THRESHOLD
}

fn default_enabled() -> bool {
    true
}

impl SessionConfig {
    /// Returns the session timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the keep-alive interval as a Duration.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Validates the session configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::validation(
                "session.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.creation_backoff_max == 0 {
            return Err(ConfigError::validation(
                "session.creation_backoff_max",
                "must be greater than 0",
            ));
        }
        if self.keep_alive_interval_secs == 0 {
            return Err(ConfigError::validation(
                "session.keep_alive_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.keep_alive_disconnect_threshold == 0 {
            return Err(ConfigError::validation(
                "session.keep_alive_disconnect_threshold",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            creation_backoff_max: DEFAULT_CREATION_BACKOFF_MAX,
            keep_alive_interval_secs: DEFAULT_KEEP_ALIVE_INTERVAL_SECS,
            keep_alive_disconnect_threshold: DEFAULT_KEEP_ALIVE_DISCONNECT_THRESHOLD,
            use_security: true,
            fetch_display_name: false,
        }
    }
}

// =============================================================================
// Subscription Configuration
// =============================================================================

/// Subscription and monitored item defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Publishing interval used when a request names none. 0 lets the
    /// server choose.
    #[serde(default)]
    pub default_publishing_interval_ms: u64,

    /// Sampling interval used when a request names none.
    #[serde(default = "default_sampling_interval")]
    pub default_sampling_interval_ms: u64,

    /// Server-side queue size for each monitored item.
    #[serde(default)]
    pub queue_size: u32,

    /// Drop the oldest queued value on overflow.
    #[serde(default = "default_enabled")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> u64 {
    DEFAULT_SAMPLING_INTERVAL_MS
}

impl SubscriptionConfig {
    /// Returns the default publishing interval as a Duration.
    pub fn default_publishing_interval(&self) -> Duration {
        Duration::from_millis(self.default_publishing_interval_ms)
    }

    /// Returns the default sampling interval as a Duration.
    pub fn default_sampling_interval(&self) -> Duration {
        Duration::from_millis(self.default_sampling_interval_ms)
    }

    /// Validates the subscription configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            default_publishing_interval_ms: 0,
            default_sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            queue_size: 0,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// Reconcile Configuration
// =============================================================================

/// Reconciliation loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Seconds between periodic passes.
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Passes allowed to run at once.
    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,

    /// Emit a configuration-changed event after a pass that changed state.
    #[serde(default = "default_enabled")]
    pub update_configuration: bool,
}

fn default_reconcile_interval() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

fn default_max_concurrent_passes() -> usize {
    DEFAULT_MAX_CONCURRENT_PASSES
}

impl ReconcileConfig {
    /// Returns the reconcile interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validates the reconcile configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::validation(
                "reconcile.interval_secs",
                "must be greater than 0",
            ));
        }
        if self.max_concurrent_passes == 0 {
            return Err(ConfigError::validation(
                "reconcile.max_concurrent_passes",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            max_concurrent_passes: DEFAULT_MAX_CONCURRENT_PASSES,
            update_configuration: true,
        }
    }
}

// =============================================================================
// Telemetry Configuration
// =============================================================================

/// Which fields a telemetry record carries.
///
/// `node_id` and `value` are always published; their flags are accepted
/// for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Publish the session endpoint URL.
    #[serde(default = "default_enabled")]
    pub endpoint_url: bool,

    /// Publish the configured node identity.
    #[serde(default = "default_enabled")]
    pub node_id: bool,

    /// Publish the server application URI.
    #[serde(default = "default_enabled")]
    pub application_uri: bool,

    /// Publish the display name.
    #[serde(default = "default_enabled")]
    pub display_name: bool,

    /// Publish the value.
    #[serde(default = "default_enabled")]
    pub value: bool,

    /// Publish the source timestamp.
    #[serde(default = "default_enabled")]
    pub source_timestamp: bool,

    /// Publish the numeric status code.
    #[serde(default)]
    pub status_code: bool,

    /// Publish the symbolic status.
    #[serde(default)]
    pub status: bool,

    /// Suffix appended to the application URI as `:<domain>`.
    #[serde(default)]
    pub shopfloor_domain: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: true,
            node_id: true,
            application_uri: true,
            display_name: true,
            value: true,
            source_timestamp: true,
            status_code: false,
            status: false,
            shopfloor_domain: None,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include span targets in logs.
    #[serde(default = "default_enabled")]
    pub with_target: bool,

    /// Include file/line in logs.
    #[serde(default)]
    pub with_file: bool,
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
            with_file: false,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty format for development.
    #[default]
    Pretty,
    /// Compact format.
    Compact,
    /// Full format with all details.
    Full,
    /// JSON format for production.
    Json,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.session.timeout(), Duration::from_secs(60));
        assert_eq!(config.session.creation_backoff_max, 5);
        assert_eq!(config.session.keep_alive_interval(), Duration::from_secs(2));
        assert_eq!(config.session.keep_alive_disconnect_threshold, 5);
        assert!(config.session.use_security);
        assert!(!config.session.fetch_display_name);
        assert_eq!(config.subscription.default_publishing_interval(), Duration::ZERO);
        assert_eq!(
            config.subscription.default_sampling_interval(),
            Duration::from_millis(1000)
        );
        assert_eq!(config.reconcile.interval(), Duration::from_secs(30));
        assert_eq!(config.reconcile.max_concurrent_passes, 4);
        assert!(config.telemetry.source_timestamp);
        assert!(!config.telemetry.status_code);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config: PublisherConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PublisherConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<PublisherConfig, _> =
            serde_json::from_str(r#"{"session": {"timeout": 5}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = PublisherConfig::default();
        config.session.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "session.timeout_secs"
        ));

        let mut config = PublisherConfig::default();
        config.session.keep_alive_disconnect_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.reconcile.max_concurrent_passes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_serde() {
        let logging: LoggingConfig =
            serde_json::from_str(r#"{"level": "debug", "format": "json"}"#).unwrap();
        assert_eq!(logging.level, LogLevel::Debug);
        assert_eq!(logging.level.as_str(), "debug");
        assert_eq!(logging.format, LogFormat::Json);
        assert!(logging.with_target);
    }
}
