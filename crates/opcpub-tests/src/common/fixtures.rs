// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built test data for consistent and reproducible testing.
//!
//! ## Design Principles
//!
//! - Fixtures are immutable and thread-safe
//! - Each fixture represents a realistic scenario
//! - Fixtures can be composed for complex test scenarios

use std::time::Duration;

use opcpub_opcua::{ExpandedNodeId, NodeId, NodeIdentifier, PointIdentity};

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// Fixture providing endpoint URLs.
pub struct Endpoints;

impl Endpoints {
    /// The main PLC endpoint.
    pub fn plc() -> &'static str {
        "opc.tcp://plc.local:4840"
    }

    /// A second, unrelated server.
    pub fn historian() -> &'static str {
        "opc.tcp://historian.local:4840"
    }

    /// Multiple endpoints for batch testing.
    pub fn endpoint_batch(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("opc.tcp://server-{:03}.local:4840", i))
            .collect()
    }
}

// =============================================================================
// Namespace Fixtures
// =============================================================================

/// Fixture providing server namespace tables.
pub struct Namespaces;

impl Namespaces {
    /// The OPC UA base namespace.
    pub const UA: &'static str = "http://opcfoundation.org/UA/";

    /// The server's local namespace.
    pub const LOCAL: &'static str = "urn:mock:server";

    /// A vendor namespace, index 2 in [`Namespaces::standard`].
    pub const ACME: &'static str = "http://acme.com/UA";

    /// A second vendor namespace, index 3 in [`Namespaces::standard`].
    pub const BOILER: &'static str = "http://boiler.example/UA";

    /// The default namespace table of the mock server.
    pub fn standard() -> Vec<String> {
        vec![
            Self::UA.to_string(),
            Self::LOCAL.to_string(),
            Self::ACME.to_string(),
            Self::BOILER.to_string(),
        ]
    }

    /// The default table after the server swapped its vendor namespaces.
    pub fn renumbered() -> Vec<String> {
        vec![
            Self::UA.to_string(),
            Self::LOCAL.to_string(),
            Self::BOILER.to_string(),
            Self::ACME.to_string(),
        ]
    }
}

// =============================================================================
// Point Fixtures
// =============================================================================

/// Fixture providing point identities.
pub struct Points;

impl Points {
    /// `ns=2;i=<id>`.
    pub fn numeric(id: u32) -> PointIdentity {
        PointIdentity::from(NodeId::numeric(2, id))
    }

    /// `ns=2;s=<name>`.
    pub fn named(name: &str) -> PointIdentity {
        PointIdentity::from(NodeId::string(2, name))
    }

    /// `nsu=<ACME>;i=<id>`, the same node as [`Points::numeric`] on the
    /// standard table.
    pub fn acme_numeric(id: u32) -> PointIdentity {
        PointIdentity::from(ExpandedNodeId::with_uri(
            Namespaces::ACME,
            NodeIdentifier::Numeric(id),
        ))
    }

    /// `nsu=<ACME>;s=<name>`.
    pub fn acme_named(name: &str) -> PointIdentity {
        PointIdentity::from(ExpandedNodeId::with_uri(
            Namespaces::ACME,
            NodeIdentifier::String(name.to_string()),
        ))
    }

    /// Node id the server monitors for `ns=2;i=<id>`.
    pub fn node(id: u32) -> NodeId {
        NodeId::numeric(2, id)
    }

    /// Multiple numeric points for batch testing.
    pub fn numeric_batch(start: u32, count: u32) -> Vec<PointIdentity> {
        (start..start + count).map(Self::numeric).collect()
    }
}

// =============================================================================
// Interval Fixtures
// =============================================================================

/// Fixture providing publishing and sampling intervals.
pub struct Intervals;

impl Intervals {
    /// One second.
    pub fn fast() -> Duration {
        Duration::from_millis(1000)
    }

    /// Five seconds.
    pub fn slow() -> Duration {
        Duration::from_secs(5)
    }

    /// Half a second.
    pub fn sampling() -> Duration {
        Duration::from_millis(500)
    }
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Fixture providing configuration snippets.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Minimal valid YAML configuration.
    pub fn minimal_yaml() -> &'static str {
        r#"
session:
  timeout_secs: 30
"#
    }

    /// Complete YAML configuration with all sections.
    pub fn complete_yaml() -> &'static str {
        r#"
session:
  timeout_secs: 60
  creation_backoff_max: 5
  keep_alive_interval_secs: 2
  keep_alive_disconnect_threshold: 5
  use_security: false
  fetch_display_name: true

subscription:
  default_publishing_interval_ms: 1000
  default_sampling_interval_ms: 500
  queue_size: 10
  discard_oldest: true

reconcile:
  interval_secs: 30
  max_concurrent_passes: 8
  update_configuration: true

telemetry:
  endpoint_url: true
  node_id: true
  application_uri: true
  display_name: true
  value: true
  source_timestamp: true
  status_code: true
  status: true
  shopfloor_domain: plant-7

logging:
  level: info
  format: json
"#
    }

    /// The complete configuration in TOML.
    pub fn complete_toml() -> &'static str {
        r#"
[session]
timeout_secs = 60
use_security = false

[subscription]
default_publishing_interval_ms = 1000
default_sampling_interval_ms = 500

[reconcile]
interval_secs = 15

[telemetry]
status = true
shopfloor_domain = "plant-7"
"#
    }

    /// Invalid YAML configuration for error testing.
    pub fn invalid_yaml() -> &'static str {
        r#"
session:
  timeout_secs: [invalid yaml
"#
    }

    /// Configuration that parses but fails validation.
    pub fn zero_timeout_yaml() -> &'static str {
        r#"
session:
  timeout_secs: 0
"#
    }

    /// Configuration with an unknown key.
    pub fn unknown_field_yaml() -> &'static str {
        r#"
session:
  timeout_secs: 30
  retries: 3
"#
    }
}
