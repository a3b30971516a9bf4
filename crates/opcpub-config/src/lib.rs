// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub-config
//!
//! Configuration management for the OPC UA publisher.
//!
//! ## Features
//!
//! - **Schema Definition**: publisher settings with defaults and validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Placeholders**: `${VAR}` / `${VAR:default}` resolved from the environment
//! - **Logging**: `tracing-subscriber` setup driven by the `logging` section
//!
//! ## Quick Start
//!
//! ```no_run
//! use opcpub_config::loader::load_config;
//!
//! let config = load_config("publisher.yaml").unwrap();
//!
//! println!("Session timeout: {}s", config.session.timeout_secs);
//! ```
//!
//! ## Configuration Schema
//!
//! - `session` - Session timeout, connect backoff, keep-alive
//! - `subscription` - Default publishing/sampling intervals and queueing
//! - `reconcile` - Reconciliation interval and concurrency
//! - `telemetry` - Which fields telemetry records carry
//! - `logging` - Logging configuration
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! session:
//!   timeout_secs: ${OPCPUB_SESSION_TIMEOUT:60}
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod logging;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    LogFormat, LogLevel, LoggingConfig, PublisherConfig, ReconcileConfig, SessionConfig,
    SubscriptionConfig, TelemetryConfig,
};

pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use logging::{init_logging, try_init_logging};
