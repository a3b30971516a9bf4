// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node addressing and value types.
//!
//! A point can be configured in one of two forms:
//!
//! - **NodeId** (`ns=2;s=Temperature`): addressed by the namespace *index*,
//!   which is only meaningful for one particular server.
//! - **ExpandedNodeId** (`nsu=http://acme.com/UA;s=Temperature`): addressed
//!   by the namespace *URI*, which is stable across servers and restarts.
//!
//! [`PointIdentity`] keeps whichever form the point was configured with.
//!
//! # Examples
//!
//! ```
//! use opcpub_opcua::types::{NodeId, PointIdentity};
//!
//! let node_id = NodeId::string(2, "Temperature.Value");
//! assert_eq!(node_id.to_string(), "ns=2;s=Temperature.Value");
//!
//! let identity = PointIdentity::parse("nsu=http://acme.com/UA;i=1001").unwrap();
//! assert!(identity.is_expanded());
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OpcUaError;

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier addressed by namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a new NodeId.
    #[inline]
    pub const fn new(namespace_index: u16, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }

    /// Creates a numeric NodeId.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self::new(namespace_index, NodeIdentifier::Numeric(value))
    }

    /// Creates a string NodeId.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self::new(namespace_index, NodeIdentifier::String(value.into()))
    }

    /// Creates an opaque NodeId.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self::new(namespace_index, NodeIdentifier::Opaque(value))
    }

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`; the namespace part is
    /// omitted for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=1001` (numeric, namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest.split_once(';').ok_or_else(|| {
                    OpcUaError::invalid_node_id(s, "Missing identifier after namespace")
                })?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| OpcUaError::invalid_node_id(s, "Invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        Ok(Self {
            namespace_index,
            identifier: NodeIdentifier::parse(s, identifier_part)?,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Compares two identifiers, ignoring the case of string identifiers.
    pub fn eq_ignore_case(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => self == other,
        }
    }

    /// Parses the `{i|s|g|b}=<value>` part of a node id.
    fn parse(full: &str, part: &str) -> Result<Self, OpcUaError> {
        if let Some(id) = part.strip_prefix("i=") {
            id.parse()
                .map(Self::Numeric)
                .map_err(|_| OpcUaError::invalid_node_id(full, "Invalid numeric identifier"))
        } else if let Some(id) = part.strip_prefix("s=") {
            Ok(Self::String(id.to_string()))
        } else if let Some(id) = part.strip_prefix("g=") {
            Uuid::parse_str(id)
                .map(Self::Guid)
                .map_err(|e| OpcUaError::invalid_node_id(full, format!("Invalid GUID: {}", e)))
        } else if let Some(id) = part.strip_prefix("b=") {
            BASE64
                .decode(id)
                .map(Self::Opaque)
                .map_err(|e| OpcUaError::invalid_node_id(full, format!("Invalid base64: {}", e)))
        } else {
            Err(OpcUaError::invalid_node_id(
                full,
                "Unknown identifier type. Expected i=, s=, g=, or b=",
            ))
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// A node identifier qualified by namespace URI.
///
/// When the URI is present it is authoritative and the index is only a
/// resolution cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// Namespace URI, if known.
    pub namespace_uri: Option<String>,

    /// Namespace index (used when no URI is given).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl ExpandedNodeId {
    /// Creates an ExpandedNodeId addressed by namespace URI.
    pub fn with_uri(namespace_uri: impl Into<String>, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_uri: Some(namespace_uri.into()),
            namespace_index: 0,
            identifier,
        }
    }

    /// Creates an ExpandedNodeId carrying both URI and index.
    pub fn resolved(
        namespace_uri: Option<String>,
        namespace_index: u16,
        identifier: NodeIdentifier,
    ) -> Self {
        Self {
            namespace_uri,
            namespace_index,
            identifier,
        }
    }

    /// Returns the namespace URI, if present.
    #[inline]
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_uri.as_deref()
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace_uri {
            Some(uri) => write!(f, "nsu={};{}", uri, self.identifier),
            None if self.namespace_index == 0 => write!(f, "{}", self.identifier),
            None => write!(f, "ns={};{}", self.namespace_index, self.identifier),
        }
    }
}

impl FromStr for ExpandedNodeId {
    type Err = OpcUaError;

    /// Parses `nsu=<uri>;{i|s|g|b}=<value>`, falling back to the NodeId format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("nsu=") {
            Some(rest) => {
                let (uri, id) = rest.split_once(';').ok_or_else(|| {
                    OpcUaError::invalid_node_id(s, "Missing identifier after namespace URI")
                })?;
                if uri.is_empty() {
                    return Err(OpcUaError::invalid_node_id(s, "Empty namespace URI"));
                }
                Ok(Self::with_uri(uri, NodeIdentifier::parse(s, id)?))
            }
            None => {
                let node: NodeId = s.parse()?;
                Ok(Self::resolved(None, node.namespace_index, node.identifier))
            }
        }
    }
}

// =============================================================================
// PointIdentity
// =============================================================================

/// The identity a point was configured with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "form", content = "id", rename_all = "snake_case")]
pub enum PointIdentity {
    /// Addressed by namespace index.
    Node(NodeId),
    /// Addressed by namespace URI.
    Expanded(ExpandedNodeId),
}

impl PointIdentity {
    /// Parses an identity; strings starting with `nsu=` become expanded ids.
    pub fn parse(s: &str) -> Result<Self, OpcUaError> {
        let s = s.trim();
        if s.starts_with("nsu=") {
            Ok(Self::Expanded(s.parse()?))
        } else {
            Ok(Self::Node(s.parse()?))
        }
    }

    /// Returns `true` for URI-addressed identities.
    #[inline]
    pub fn is_expanded(&self) -> bool {
        matches!(self, Self::Expanded(_))
    }

    /// Returns the node identifier regardless of form.
    pub fn identifier(&self) -> &NodeIdentifier {
        match self {
            Self::Node(n) => &n.identifier,
            Self::Expanded(e) => &e.identifier,
        }
    }

    /// Returns the node id if this identity is index-addressed.
    pub fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Self::Node(n) => Some(n),
            Self::Expanded(_) => None,
        }
    }

    /// Returns the expanded id if this identity is URI-addressed.
    pub fn as_expanded(&self) -> Option<&ExpandedNodeId> {
        match self {
            Self::Node(_) => None,
            Self::Expanded(e) => Some(e),
        }
    }
}

impl fmt::Display for PointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(n) => write!(f, "{}", n),
            Self::Expanded(e) => write!(f, "{}", e),
        }
    }
}

impl From<NodeId> for PointIdentity {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl From<ExpandedNodeId> for PointIdentity {
    fn from(node: ExpandedNodeId) -> Self {
        Self::Expanded(node)
    }
}

impl FromStr for PointIdentity {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// MonitoringMode
// =============================================================================

/// OPC UA monitoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Monitoring disabled.
    Disabled,

    /// Sampling enabled, reporting disabled.
    Sampling,

    /// Sampling and reporting enabled.
    #[default]
    Reporting,
}

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attribute IDs used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Display name attribute.
    DisplayName,
    /// Value attribute.
    #[default]
    Value,
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// Value reported by a data change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum OpcUaValue {
    /// Boolean.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// String.
    String(String),
    /// Timestamp in UTC.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(Uuid),
    /// Opaque bytes.
    ByteString(Vec<u8>),
    /// One-dimensional array.
    Array(Vec<OpcUaValue>),
    /// No value.
    Null,
}

impl OpcUaValue {
    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Boolean(v) => Value::from(*v),
            Self::SByte(v) => Value::from(*v),
            Self::Byte(v) => Value::from(*v),
            Self::Int16(v) => Value::from(*v),
            Self::UInt16(v) => Value::from(*v),
            Self::Int32(v) => Value::from(*v),
            Self::UInt32(v) => Value::from(*v),
            Self::Int64(v) => Value::from(*v),
            Self::UInt64(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v as f64),
            Self::Double(v) => Value::from(*v),
            Self::String(v) => Value::from(v.as_str()),
            Self::DateTime(v) => Value::from(v.to_rfc3339()),
            Self::Guid(v) => Value::from(v.to_string()),
            Self::ByteString(v) => Value::from(BASE64.encode(v)),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }
}

impl Default for OpcUaValue {
    fn default() -> Self {
        Self::Null
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
