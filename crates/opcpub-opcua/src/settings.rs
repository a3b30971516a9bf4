// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime settings of the engine.
//!
//! [`EngineSettings`] is the `Duration`-typed view of the file schema in
//! `opcpub-config`. Sessions, the registry and the reconciliation loop share
//! one instance behind an `Arc`.

use std::time::Duration;

use opcpub_config::{PublisherConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::client::PointSettings;
use crate::types::{humantime_serde, MonitoringMode};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Client application name announced to servers.
    pub application_name: String,

    /// Session timeout, also the base connect timeout.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Cap on the connect timeout multiplier.
    pub creation_backoff_max: u32,

    /// Keep-alive interval requested from the session.
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,

    /// Consecutive bad keep-alives before the session is dropped.
    pub keep_alive_disconnect_threshold: u32,

    /// Prefer secured endpoints.
    pub use_security: bool,

    /// Read display names when activating points.
    pub fetch_display_name: bool,

    /// Publishing interval used when a request names none.
    #[serde(with = "humantime_serde")]
    pub default_publishing_interval: Duration,

    /// Sampling interval used when a request names none.
    #[serde(with = "humantime_serde")]
    pub default_sampling_interval: Duration,

    /// Server-side queue size for new items.
    pub queue_size: u32,

    /// Drop the oldest queued value on overflow.
    pub discard_oldest: bool,

    /// Period of the reconciliation loop.
    #[serde(with = "humantime_serde")]
    pub reconcile_interval: Duration,

    /// Passes allowed to run at once.
    pub max_concurrent_passes: usize,

    /// Emit configuration-changed events after passes that changed state.
    pub update_configuration: bool,

    /// Telemetry field selection.
    pub telemetry: TelemetryConfig,
}

impl EngineSettings {
    /// Connect timeout for `base` after `failures` consecutive unsuccessful
    /// attempts. The multiplier grows by one per failure up to
    /// `creation_backoff_max`.
    pub fn connect_timeout(&self, base: Duration, failures: u32) -> Duration {
        let factor = failures.saturating_add(1).min(self.creation_backoff_max.max(1));
        base.saturating_mul(factor)
    }

    /// Point settings for a new point, using the default sampling interval
    /// unless one is given.
    pub fn point_settings(&self, sampling_interval: Option<Duration>) -> PointSettings {
        PointSettings {
            sampling_interval: sampling_interval.unwrap_or(self.default_sampling_interval),
            queue_size: self.queue_size,
            discard_oldest: self.discard_oldest,
            monitoring_mode: MonitoringMode::Reporting,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&PublisherConfig::default())
    }
}

impl From<&PublisherConfig> for EngineSettings {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            session_timeout: config.session.timeout(),
            creation_backoff_max: config.session.creation_backoff_max,
            keep_alive_interval: config.session.keep_alive_interval(),
            keep_alive_disconnect_threshold: config.session.keep_alive_disconnect_threshold,
            use_security: config.session.use_security,
            fetch_display_name: config.session.fetch_display_name,
            default_publishing_interval: config.subscription.default_publishing_interval(),
            default_sampling_interval: config.subscription.default_sampling_interval(),
            queue_size: config.subscription.queue_size,
            discard_oldest: config.subscription.discard_oldest,
            reconcile_interval: config.reconcile.interval(),
            max_concurrent_passes: config.reconcile.max_concurrent_passes,
            update_configuration: config.reconcile.update_configuration,
            telemetry: config.telemetry.clone(),
        }
    }
}
