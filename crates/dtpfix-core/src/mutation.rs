//! Atomic node mutations and their inverses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::{FieldValue, Link, NodeRecord, NodeRef};

/// Key recorded for [`MutationKind::IriReplace`] mutations.
pub const IRI_KEY: &str = "@iri";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    FieldAdd,
    FieldRemove,
    FieldReplace,
    LinkAdd,
    LinkRemove,
    IriReplace,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::FieldAdd => "field_add",
            MutationKind::FieldRemove => "field_remove",
            MutationKind::FieldReplace => "field_replace",
            MutationKind::LinkAdd => "link_add",
            MutationKind::LinkRemove => "link_remove",
            MutationKind::IriReplace => "iri_replace",
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, MutationKind::LinkAdd | MutationKind::LinkRemove)
    }

    /// Kind of the inverse mutation.
    pub fn inverse(&self) -> MutationKind {
        match self {
            MutationKind::FieldAdd => MutationKind::FieldRemove,
            MutationKind::FieldRemove => MutationKind::FieldAdd,
            MutationKind::FieldReplace => MutationKind::FieldReplace,
            MutationKind::LinkAdd => MutationKind::LinkRemove,
            MutationKind::LinkRemove => MutationKind::LinkAdd,
            MutationKind::IriReplace => MutationKind::IriReplace,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state check that failed before (or instead of) issuing a mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreconditionError {
    #[error("field `{key}` already present on {node}")]
    FieldAlreadyPresent { node: NodeRef, key: String },
    #[error("field `{key}` missing on {node}")]
    FieldMissing { node: NodeRef, key: String },
    #[error("field `{key}` on {node} is {found}, expected {expected}")]
    FieldValueMismatch {
        node: NodeRef,
        key: String,
        expected: FieldValue,
        found: FieldValue,
    },
    #[error("link `{predicate}` -> {target} already present on {node}")]
    LinkAlreadyPresent {
        node: NodeRef,
        predicate: String,
        target: NodeRef,
    },
    #[error("link `{predicate}` -> {target} missing on {node}")]
    LinkMissing {
        node: NodeRef,
        predicate: String,
        target: NodeRef,
    },
    #[error("node is addressed as {found}, mutation expects {expected}")]
    IriMismatch { expected: NodeRef, found: NodeRef },
    #[error("{kind} mutation on {node} carries no {side} value")]
    MissingValue {
        node: NodeRef,
        kind: MutationKind,
        side: &'static str,
    },
}

/// One atomic change to one node.
///
/// Link mutations carry the predicate in `key` and the target IRI (as a JSON
/// string) in `new_value` (add) or `old_value` (remove). IRI replacements carry
/// the pre-IRI in `old_value` and the post-IRI in `new_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub node: NodeRef,
    pub kind: MutationKind,
    pub key: String,
    #[serde(default)]
    pub old_value: Option<FieldValue>,
    #[serde(default)]
    pub new_value: Option<FieldValue>,
}

impl Mutation {
    pub fn field_add(node: &NodeRef, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            node: node.clone(),
            kind: MutationKind::FieldAdd,
            key: key.into(),
            old_value: None,
            new_value: Some(value.into()),
        }
    }

    pub fn field_remove(node: &NodeRef, key: impl Into<String>, old: impl Into<FieldValue>) -> Self {
        Self {
            node: node.clone(),
            kind: MutationKind::FieldRemove,
            key: key.into(),
            old_value: Some(old.into()),
            new_value: None,
        }
    }

    pub fn field_replace(
        node: &NodeRef,
        key: impl Into<String>,
        old: impl Into<FieldValue>,
        new: impl Into<FieldValue>,
    ) -> Self {
        Self {
            node: node.clone(),
            kind: MutationKind::FieldReplace,
            key: key.into(),
            old_value: Some(old.into()),
            new_value: Some(new.into()),
        }
    }

    pub fn link_add(node: &NodeRef, predicate: impl Into<String>, target: &NodeRef) -> Self {
        Self {
            node: node.clone(),
            kind: MutationKind::LinkAdd,
            key: predicate.into(),
            old_value: None,
            new_value: Some(FieldValue::String(target.to_string())),
        }
    }

    pub fn link_remove(node: &NodeRef, predicate: impl Into<String>, target: &NodeRef) -> Self {
        Self {
            node: node.clone(),
            kind: MutationKind::LinkRemove,
            key: predicate.into(),
            old_value: Some(FieldValue::String(target.to_string())),
            new_value: None,
        }
    }

    pub fn iri_replace(old: &NodeRef, new: &NodeRef) -> Self {
        Self {
            node: old.clone(),
            kind: MutationKind::IriReplace,
            key: IRI_KEY.to_string(),
            old_value: Some(FieldValue::String(old.to_string())),
            new_value: Some(FieldValue::String(new.to_string())),
        }
    }

    /// Target of a link mutation.
    pub fn link_target(&self) -> Option<NodeRef> {
        let value = match self.kind {
            MutationKind::LinkAdd => self.new_value.as_ref(),
            MutationKind::LinkRemove => self.old_value.as_ref(),
            _ => None,
        }?;
        value.as_str().map(NodeRef::from)
    }

    /// IRI the node is addressed by once this mutation has been applied.
    pub fn post_iri(&self) -> NodeRef {
        match self.kind {
            MutationKind::IriReplace => self
                .new_value
                .as_ref()
                .and_then(|v| v.as_str())
                .map(NodeRef::from)
                .unwrap_or_else(|| self.node.clone()),
            _ => self.node.clone(),
        }
    }

    /// The mutation that undoes this one.
    ///
    /// Values are swapped and add/remove kinds flipped. The inverse of an IRI
    /// replacement is addressed to the post-IRI, since that is where the node
    /// lives after the forward mutation.
    pub fn inverse(&self) -> Mutation {
        Mutation {
            node: self.post_iri(),
            kind: self.kind.inverse(),
            key: self.key.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }

    /// Same mutation addressed to `iri`. IRI replacements also move their pre-IRI.
    pub fn addressed_to(mut self, iri: &NodeRef) -> Mutation {
        if self.kind == MutationKind::IriReplace {
            self.old_value = Some(FieldValue::String(iri.to_string()));
        }
        self.node = iri.clone();
        self
    }

    fn required<'a>(
        &self,
        value: &'a Option<FieldValue>,
        side: &'static str,
    ) -> Result<&'a FieldValue, PreconditionError> {
        value
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or_else(|| PreconditionError::MissingValue {
                node: self.node.clone(),
                kind: self.kind,
                side,
            })
    }

    fn required_target(&self) -> Result<NodeRef, PreconditionError> {
        self.link_target().ok_or_else(|| PreconditionError::MissingValue {
            node: self.node.clone(),
            kind: self.kind,
            side: "target",
        })
    }

    /// Checks that `record` is in a state this mutation can be applied to.
    pub fn check(&self, record: &NodeRecord) -> Result<(), PreconditionError> {
        if record.iri != self.node {
            return Err(PreconditionError::IriMismatch {
                expected: self.node.clone(),
                found: record.iri.clone(),
            });
        }
        match self.kind {
            MutationKind::FieldAdd => {
                self.required(&self.new_value, "new")?;
                if record.has_field(&self.key) {
                    return Err(PreconditionError::FieldAlreadyPresent {
                        node: self.node.clone(),
                        key: self.key.clone(),
                    });
                }
            }
            MutationKind::FieldRemove | MutationKind::FieldReplace => {
                if self.kind == MutationKind::FieldReplace {
                    self.required(&self.new_value, "new")?;
                }
                let current = record.field(&self.key).ok_or_else(|| {
                    PreconditionError::FieldMissing {
                        node: self.node.clone(),
                        key: self.key.clone(),
                    }
                })?;
                if let Some(expected) = self.old_value.as_ref().filter(|v| !v.is_null()) {
                    if expected != current {
                        return Err(PreconditionError::FieldValueMismatch {
                            node: self.node.clone(),
                            key: self.key.clone(),
                            expected: expected.clone(),
                            found: current.clone(),
                        });
                    }
                }
            }
            MutationKind::LinkAdd => {
                let target = self.required_target()?;
                if record.has_link(&self.key, &target) {
                    return Err(PreconditionError::LinkAlreadyPresent {
                        node: self.node.clone(),
                        predicate: self.key.clone(),
                        target,
                    });
                }
            }
            MutationKind::LinkRemove => {
                let target = self.required_target()?;
                if !record.has_link(&self.key, &target) {
                    return Err(PreconditionError::LinkMissing {
                        node: self.node.clone(),
                        predicate: self.key.clone(),
                        target,
                    });
                }
            }
            MutationKind::IriReplace => {
                self.required(&self.new_value, "new")?;
            }
        }
        Ok(())
    }

    /// Applies this mutation to a local snapshot after checking preconditions.
    pub fn apply_to(&self, record: &mut NodeRecord) -> Result<(), PreconditionError> {
        self.check(record)?;
        match self.kind {
            MutationKind::FieldAdd | MutationKind::FieldReplace => {
                let value = self.required(&self.new_value, "new")?.clone();
                record.fields.insert(self.key.clone(), value);
            }
            MutationKind::FieldRemove => {
                record.fields.remove(&self.key);
            }
            MutationKind::LinkAdd => {
                let target = self.required_target()?;
                record.links.push(Link::new(self.key.clone(), target));
            }
            MutationKind::LinkRemove => {
                let target = self.required_target()?;
                record
                    .links
                    .retain(|l| !(l.predicate == self.key && l.target == target));
            }
            MutationKind::IriReplace => {
                record.iri = self.post_iri();
            }
        }
        Ok(())
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} `{}`", self.kind, self.node, self.key)
    }
}
