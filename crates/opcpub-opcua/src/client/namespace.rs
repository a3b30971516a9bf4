// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-session namespace table.
//!
//! Servers number their namespaces locally; the table maps the URIs they
//! report to the indices used in `ns=` node ids. The table is fetched once
//! per successful connect and owned by exactly one session.

use crate::error::NamespaceError;
use crate::types::{ExpandedNodeId, NodeId};

/// Namespace URI <-> index resolver for one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceResolver {
    uris: Vec<String>,
}

impl NamespaceResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver from a namespace array.
    pub fn from_uris<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
        }
    }

    /// Replaces the table with the server's current namespace array.
    pub fn update<I, S>(&mut self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uris = uris.into_iter().map(Into::into).collect();
        tracing::trace!(namespaces = self.uris.len(), "Namespace table updated");
    }

    /// Returns the index of `uri`, if the server knows it.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris
            .iter()
            .position(|u| u == uri)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Returns the URI registered at `index`.
    pub fn uri_of(&self, index: u16) -> Option<&str> {
        self.uris.get(index as usize).map(String::as_str)
    }

    /// Number of namespaces in the table.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Returns `true` before the first table has been loaded.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// All namespace URIs in index order.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Resolves an expanded id to a node id the server can address.
    ///
    /// The URI wins when present; otherwise the carried index is used as is.
    pub fn to_node_id(&self, id: &ExpandedNodeId) -> Result<NodeId, NamespaceError> {
        let namespace_index = match id.namespace_uri() {
            Some(uri) => self
                .index_of(uri)
                .ok_or_else(|| NamespaceError::unknown_uri(uri))?,
            None => id.namespace_index,
        };
        Ok(NodeId::new(namespace_index, id.identifier.clone()))
    }

    /// Expresses a node id in URI form.
    pub fn to_expanded(&self, node: &NodeId) -> Result<ExpandedNodeId, NamespaceError> {
        let uri = self
            .uri_of(node.namespace_index)
            .ok_or_else(|| NamespaceError::unknown_index(node.namespace_index))?;
        Ok(ExpandedNodeId::resolved(
            Some(uri.to_string()),
            node.namespace_index,
            node.identifier.clone(),
        ))
    }
}
