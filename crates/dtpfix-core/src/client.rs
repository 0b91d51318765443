//! Graph client boundary.
//!
//! The engine never talks to the remote store directly; it goes through
//! [`GraphClient`]. Implementations: `MemoryGraph` (this crate) and the HTTP
//! client in `dtpfix-cli`.

use crate::node::{FieldValue, NodeRecord, NodeRef, NodeType, OntologyLevel};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("node not found: {0}")]
    NotFound(NodeRef),
    #[error("store rejected update of {iri}: {message}")]
    Rejected { iri: NodeRef, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Add,
    Remove,
}

/// One page of a level/type query.
#[derive(Debug, Clone, Default)]
pub struct NodePage {
    pub nodes: Vec<NodeRecord>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

pub trait GraphClient {
    /// Fetches one node by IRI. `Ok(None)` when no node has this IRI.
    fn fetch(&self, iri: &NodeRef) -> Result<Option<NodeRecord>, GraphError>;

    /// Fetches one page of nodes at `level` with provenance `node_type`.
    fn fetch_by_level_and_type(
        &self,
        level: OntologyLevel,
        node_type: NodeType,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<NodePage, GraphError>;

    fn add_field(&self, iri: &NodeRef, key: &str, value: &FieldValue) -> Result<(), GraphError>;

    /// Removes `key`. `previous` is the value the caller believes is stored.
    fn remove_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
    ) -> Result<(), GraphError>;

    fn replace_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
        value: &FieldValue,
    ) -> Result<(), GraphError>;

    fn apply_link(
        &self,
        iri: &NodeRef,
        predicate: &str,
        target: &NodeRef,
        op: LinkOp,
    ) -> Result<(), GraphError>;

    /// Re-addresses the node at `old` as `new`, keeping its fields and links.
    fn replace_iri(&self, old: &NodeRef, new: &NodeRef) -> Result<(), GraphError>;
}
