//! Node snapshots and the level/type vocabulary used to select them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identity
// ============================================================================

/// IRI naming one graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scalar value of a node field. `null` is treated as "field absent".
pub type FieldValue = serde_json::Value;

/// A directed, predicate-labelled edge to another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub predicate: String,
    pub target: NodeRef,
}

impl Link {
    pub fn new(predicate: impl Into<String>, target: impl Into<NodeRef>) -> Self {
        Self {
            predicate: predicate.into(),
            target: target.into(),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A node as fetched from the store: its IRI, field values and outgoing links.
///
/// This is a read-only snapshot. The store may change underneath it; the
/// revert path re-fetches before acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub iri: NodeRef,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl NodeRecord {
    pub fn new(iri: impl Into<NodeRef>) -> Self {
        Self {
            iri: iri.into(),
            fields: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_link(mut self, predicate: impl Into<String>, target: impl Into<NodeRef>) -> Self {
        self.links.push(Link::new(predicate, target));
        self
    }

    /// Current value of `key`, ignoring `null`s.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub fn has_link(&self, predicate: &str, target: &NodeRef) -> bool {
        self.links
            .iter()
            .any(|l| l.predicate == predicate && &l.target == target)
    }

    /// Targets of every outgoing link labelled `predicate`.
    pub fn link_targets<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a NodeRef> {
        self.links
            .iter()
            .filter(move |l| l.predicate == predicate)
            .map(|l| &l.target)
    }

    /// Drops `null` fields and duplicate links.
    pub fn normalized(mut self) -> Self {
        self.fields.retain(|_, v| !v.is_null());
        let mut seen = Vec::with_capacity(self.links.len());
        for link in self.links.drain(..) {
            if !seen.contains(&link) {
                seen.push(link);
            }
        }
        self.links = seen;
        self
    }
}

// ============================================================================
// Levels, provenance types and "all" targets
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}` (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Closed enumerations that can be expanded from `all`.
pub trait Enumerable: Sized + Copy + 'static {
    const ALL: &'static [Self];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OntologyLevel {
    Element,
    Task,
    Activity,
}

impl OntologyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OntologyLevel::Element => "element",
            OntologyLevel::Task => "task",
            OntologyLevel::Activity => "activity",
        }
    }
}

impl Enumerable for OntologyLevel {
    const ALL: &'static [Self] = &[
        OntologyLevel::Element,
        OntologyLevel::Task,
        OntologyLevel::Activity,
    ];
}

impl fmt::Display for OntologyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OntologyLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "element" => Ok(OntologyLevel::Element),
            "task" => Ok(OntologyLevel::Task),
            "activity" => Ok(OntologyLevel::Activity),
            _ => Err(ParseEnumError {
                kind: "ontology level",
                value: s.to_string(),
                expected: "element, task, activity".to_string(),
            }),
        }
    }
}

/// Provenance of a node: observed on site (as-built) or planned (as-designed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    AsBuilt,
    AsDesigned,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::AsBuilt => "asbuilt",
            NodeType::AsDesigned => "asdesigned",
        }
    }

    pub fn is_as_designed(&self) -> bool {
        matches!(self, NodeType::AsDesigned)
    }
}

impl Enumerable for NodeType {
    const ALL: &'static [Self] = &[NodeType::AsBuilt, NodeType::AsDesigned];
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "asbuilt" => Ok(NodeType::AsBuilt),
            "asdesigned" => Ok(NodeType::AsDesigned),
            _ => Err(ParseEnumError {
                kind: "node type",
                value: s.to_string(),
                expected: "asbuilt, asdesigned".to_string(),
            }),
        }
    }
}

/// Either one concrete value or `all` of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target<T> {
    All,
    Only(T),
}

impl<T: Enumerable> Target<T> {
    pub fn expand(&self) -> Vec<T> {
        match self {
            Target::All => T::ALL.to_vec(),
            Target::Only(v) => vec![*v],
        }
    }
}

impl<T: fmt::Display> fmt::Display for Target<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str("all"),
            Target::Only(v) => v.fmt(f),
        }
    }
}

impl<T: FromStr> FromStr for Target<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Target::All)
        } else {
            s.parse().map(Target::Only)
        }
    }
}
