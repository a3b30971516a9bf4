// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the publisher engine.
//!
//! Every failure reported by the remote protocol stack carries an OPC UA
//! [`StatusCode`]. The engine does not react to individual codes directly;
//! instead each error is mapped to a [`FailureClass`] which decides how a
//! reconciliation pass continues:
//!
//! | Class             | Examples                                    | Pass reaction          |
//! |-------------------|---------------------------------------------|------------------------|
//! | `TransportFatal`  | `BadSessionIdInvalid`, `BadSessionClosed`   | abort, disconnect      |
//! | `ItemRecoverable` | `BadNodeIdUnknown`, unknown namespace       | skip the point         |
//! | `Transient`       | anything else                               | log, continue          |
//!
//! # Examples
//!
//! ```
//! use opcpub_opcua::error::{FailureClass, OpcUaError, StatusCode};
//!
//! let error = OpcUaError::bad_status("AddItem", StatusCode::BAD_SESSION_ID_INVALID);
//! assert_eq!(error.failure_class(), FailureClass::TransportFatal);
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// StatusCode
// =============================================================================

/// An OPC UA status code as returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Uncertain result.
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    /// Generic bad result.
    pub const BAD: Self = Self(0x8000_0000);
    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// Internal error in the server.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// Low-level communication failure.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// The server does not support the service.
    pub const BAD_SERVICE_UNSUPPORTED: Self = Self(0x800B_0000);
    /// The server is shutting down.
    pub const BAD_SHUTDOWN: Self = Self(0x800C_0000);
    /// The server is not connected.
    pub const BAD_SERVER_NOT_CONNECTED: Self = Self(0x800D_0000);
    /// The user may not perform the operation.
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// The node id syntax is not valid.
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    /// The node id refers to no node in the address space.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// The attribute is not supported by the node.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// A requested item was not found.
    pub const BAD_NOT_FOUND: Self = Self(0x803E_0000);
    /// The monitored item id does not exist.
    pub const BAD_MONITORED_ITEM_ID_INVALID: Self = Self(0x8042_0000);
    /// There is no subscription available for this session.
    pub const BAD_NO_SUBSCRIPTION: Self = Self(0x8079_0000);
    /// The secure channel has been closed.
    pub const BAD_SECURE_CHANNEL_CLOSED: Self = Self(0x8086_0000);
    /// The client is not connected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x808A_0000);
    /// The network connection has been closed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);
    /// The subscription has reached its item limit.
    pub const BAD_TOO_MANY_MONITORED_ITEMS: Self = Self(0x80DB_0000);

    /// Returns the severity bits of the code.
    #[inline]
    fn severity_bits(self) -> u32 {
        self.0 & 0xC000_0000
    }

    /// Returns `true` for a good status.
    #[inline]
    pub fn is_good(self) -> bool {
        self.severity_bits() == 0
    }

    /// Returns `true` for an uncertain status.
    #[inline]
    pub fn is_uncertain(self) -> bool {
        self.severity_bits() == 0x4000_0000
    }

    /// Returns `true` for a bad status.
    #[inline]
    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the code with the info bits masked off.
    #[inline]
    pub fn sub_code(self) -> Self {
        Self(self.0 & 0xFFFF_0000)
    }

    /// Returns the symbolic name of the status code.
    pub fn name(self) -> &'static str {
        match self.sub_code() {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SERVICE_UNSUPPORTED => "BadServiceUnsupported",
            Self::BAD_SHUTDOWN => "BadShutdown",
            Self::BAD_SERVER_NOT_CONNECTED => "BadServerNotConnected",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_FOUND => "BadNotFound",
            Self::BAD_MONITORED_ITEM_ID_INVALID => "BadMonitoredItemIdInvalid",
            Self::BAD_NO_SUBSCRIPTION => "BadNoSubscription",
            Self::BAD_SECURE_CHANNEL_CLOSED => "BadSecureChannelClosed",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            Self::BAD_TOO_MANY_MONITORED_ITEMS => "BadTooManyMonitoredItems",
            other if other.is_good() => "Good",
            other if other.is_uncertain() => "Uncertain",
            _ => "Bad",
        }
    }

    /// Classifies the status code for the reconciliation pass.
    pub fn failure_class(self) -> FailureClass {
        match self.sub_code() {
            Self::BAD_SESSION_ID_INVALID
            | Self::BAD_SESSION_CLOSED
            | Self::BAD_SECURE_CHANNEL_CLOSED => FailureClass::TransportFatal,
            Self::BAD_NODE_ID_INVALID | Self::BAD_NODE_ID_UNKNOWN => FailureClass::ItemRecoverable,
            _ => FailureClass::Transient,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// =============================================================================
// FailureClass
// =============================================================================

/// How a failure affects the rest of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The remote session is gone; abort the pass and disconnect.
    TransportFatal,
    /// Only the current point is affected; skip it and continue.
    ItemRecoverable,
    /// Unclassified failure; log and continue.
    Transient,
}

impl FailureClass {
    /// Returns `true` if the session must be torn down.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportFatal)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportFatal => write!(f, "transport_fatal"),
            Self::ItemRecoverable => write!(f, "item_recoverable"),
            Self::Transient => write!(f, "transient"),
        }
    }
}


// =============================================================================
// OpcUaError
// =============================================================================

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Session establishment failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The local session object was shut down.
    #[error("Session for {endpoint} has been shut down")]
    Terminated {
        /// Endpoint of the session.
        endpoint: String,
    },

    /// A service call was answered with a bad status.
    #[error("{operation} failed: {status}")]
    BadStatus {
        /// Service or step that failed.
        operation: String,
        /// Status returned by the server.
        status: StatusCode,
    },

    /// The server refused to monitor a node.
    #[error("Monitored item for {node_id} rejected: {status}")]
    ItemRejected {
        /// Node the item was created for.
        node_id: String,
        /// Status returned by the server.
        status: StatusCode,
    },

    /// A read returned a value of the wrong shape.
    #[error("Read of {node_id} failed: {message}")]
    UnexpectedValue {
        /// Node that was read.
        node_id: String,
        /// What was wrong with the value.
        message: String,
    },

    /// Namespace table resolution failed.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// A node identifier could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The text that failed to parse.
        node_id: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl OpcUaError {
    /// Creates a "bad status" error for a service call.
    pub fn bad_status(operation: impl Into<String>, status: StatusCode) -> Self {
        Self::BadStatus {
            operation: operation.into(),
            status,
        }
    }

    /// Creates a monitored item rejection.
    pub fn item_rejected(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::ItemRejected {
            node_id: node_id.into(),
            status,
        }
    }

    /// Creates an error for a read whose value has the wrong shape.
    pub fn unexpected_value(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates an error for an operation on a shut down session.
    pub fn terminated(endpoint: impl Into<String>) -> Self {
        Self::Terminated {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the status code reported by the server, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::BadStatus { status, .. } | Self::ItemRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies this error for the reconciliation pass.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Namespace(_) | Self::InvalidNodeId { .. } => FailureClass::ItemRecoverable,
            _ => self
                .status_code()
                .map(StatusCode::failure_class)
                .unwrap_or(FailureClass::Transient),
        }
    }

    /// Logs this error at a level matching its failure class.
    pub fn log(&self, context: &str) {
        let class = self.failure_class();
        if class.is_fatal() {
            tracing::error!(class = %class, context, "{self}");
        } else {
            tracing::warn!(class = %class, context, "{self}");
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Errors raised while establishing a session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server could not be reached or refused the session.
    #[error("Connection to {endpoint} failed: {message}")]
    Unreachable {
        /// Endpoint URL.
        endpoint: String,
        /// Transport message.
        message: String,
    },

    /// Session establishment exceeded the allowed time.
    #[error("Connection to {endpoint} timed out after {duration:?}")]
    TimedOut {
        /// Endpoint URL.
        endpoint: String,
        /// Time allowed for the attempt.
        duration: Duration,
    },
}

impl ConnectionError {
    /// Creates an unreachable server error.
    pub fn unreachable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }
}

// =============================================================================
// NamespaceError
// =============================================================================

/// Namespace table resolution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamespaceError {
    /// The namespace URI is not in the server's namespace table.
    #[error("Namespace URI '{uri}' is not known to the server")]
    UnknownUri {
        /// The namespace URI looked up.
        uri: String,
    },

    /// The namespace index is outside the server's namespace table.
    #[error("Namespace index {index} is not known to the server")]
    UnknownIndex {
        /// The namespace index looked up.
        index: u16,
    },
}

impl NamespaceError {
    /// Creates an unknown URI error.
    pub fn unknown_uri(uri: impl Into<String>) -> Self {
        Self::UnknownUri { uri: uri.into() }
    }

    /// Creates an unknown index error.
    pub fn unknown_index(index: u16) -> Self {
        Self::UnknownIndex { index }
    }
}

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;
