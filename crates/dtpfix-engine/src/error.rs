//! Error taxonomy.
//!
//! Per-node errors ([`ExecutionError`], [`RevertConflict`], rule errors) are
//! isolated and reported; [`SelectionError`] and [`JournalError`] abort the run.

use serde::Serialize;
use std::path::PathBuf;

use dtpfix_core::{
    FieldValue, GraphError, MutationKind, NodeRef, NodeType, OntologyLevel, PreconditionError,
};
use dtpfix_rules::UnknownFix;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("selecting {level}/{node_type} nodes failed: {source}")]
    Query {
        level: OntologyLevel,
        node_type: NodeType,
        #[source]
        source: GraphError,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("{kind} on {node} failed: {source}")]
    Graph {
        node: NodeRef,
        kind: MutationKind,
        #[source]
        source: GraphError,
    },
}

/// The store no longer shows the effect a journal entry recorded.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum RevertConflict {
    #[error("node {node} no longer exists")]
    NodeMissing { node: NodeRef },
    #[error("field `{key}` on {node} is {found:?}, journal expects {expected:?}")]
    FieldDrifted {
        node: NodeRef,
        key: String,
        expected: Option<FieldValue>,
        found: Option<FieldValue>,
    },
    #[error("link `{predicate}` -> {target} on {node} should be {}", presence(.expected_present))]
    LinkDrifted {
        node: NodeRef,
        predicate: String,
        target: NodeRef,
        expected_present: bool,
    },
    #[error("cannot move {node} back to {iri}: another node lives there")]
    IriOccupied { node: NodeRef, iri: NodeRef },
    #[error("journal entry is malformed: {reason}")]
    Malformed { reason: String },
}

fn presence(expected_present: &bool) -> &'static str {
    if *expected_present {
        "present"
    } else {
        "absent"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode journal entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{path}:{line}: malformed journal entry: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}:{line}: unsupported journal entry version `{version}`")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        version: String,
    },
    #[error("no session journal at {0}")]
    NotFound(PathBuf),
}

impl JournalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JournalError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal run errors.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    UnknownFix(#[from] UnknownFix),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}
