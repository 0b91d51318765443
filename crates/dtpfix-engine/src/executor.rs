//! Mutation executor.
//!
//! Applies one node's batch in order. Preconditions are checked against a local
//! snapshot that tracks the batch's own effects, so a simulated run reports the
//! same outcome a real run would on an unchanged store. Execution stops at the
//! first failure; the store offers no multi-field transaction, so what already
//! succeeded stays applied and journaled.

use serde::{Deserialize, Serialize};
use std::fmt;

use dtpfix_core::{
    FieldValue, GraphClient, GraphError, LinkOp, Mutation, MutationKind, NodeRecord, NodeRef,
    PreconditionError,
};

use crate::error::{ExecutionError, JournalError};
use crate::journal::SessionJournal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Real,
    Simulated,
}

impl Mode {
    pub fn from_simulate(simulate: bool) -> Self {
        if simulate {
            Mode::Simulated
        } else {
            Mode::Real
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Real => "real",
            Mode::Simulated => "simulated",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation together with the fix that asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMutation {
    pub fix: String,
    pub mutation: Mutation,
}

impl PlannedMutation {
    pub fn new(fix: impl Into<String>, mutation: Mutation) -> Self {
        Self {
            fix: fix.into(),
            mutation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Empty batch.
    Unchanged,
    Complete,
    /// A mutation failed; earlier ones stay applied.
    Partial,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// IRI the node had when the batch started.
    pub node: NodeRef,
    /// IRI the node has after the applied mutations.
    pub final_iri: NodeRef,
    pub mode: Mode,
    pub status: OutcomeStatus,
    /// Applied (or, when simulated, validated) mutations, as issued.
    pub applied: Vec<PlannedMutation>,
    pub failed: Option<(PlannedMutation, ExecutionError)>,
    /// Mutations not attempted because an earlier one failed.
    pub skipped: Vec<PlannedMutation>,
}

impl ExecutionOutcome {
    pub fn is_simulated(&self) -> bool {
        self.mode == Mode::Simulated
    }
}

pub struct Executor<'g, G: GraphClient + ?Sized> {
    client: &'g G,
}

impl<'g, G: GraphClient + ?Sized> Executor<'g, G> {
    pub fn new(client: &'g G) -> Self {
        Self { client }
    }

    /// Applies `batch` to `node`. Each applied mutation is recorded in
    /// `journal` before the next one starts; a journal failure is returned as
    /// an error since the run can no longer be reverted reliably.
    pub fn apply(
        &self,
        node: &NodeRecord,
        batch: Vec<PlannedMutation>,
        mode: Mode,
        mut journal: Option<&mut SessionJournal>,
    ) -> Result<ExecutionOutcome, JournalError> {
        let mut snapshot = node.clone();
        let mut applied = Vec::with_capacity(batch.len());
        let mut failed = None;
        let mut pending = batch.into_iter();

        for planned in pending.by_ref() {
            let mutation = if planned.mutation.node == node.iri && snapshot.iri != node.iri {
                planned.mutation.clone().addressed_to(&snapshot.iri)
            } else {
                planned.mutation.clone()
            };

            let mut next = snapshot.clone();
            let result = mutation
                .apply_to(&mut next)
                .map_err(ExecutionError::from)
                .and_then(|()| match mode {
                    Mode::Real => self.dispatch(&mutation),
                    Mode::Simulated => Ok(()),
                });

            if let Err(err) = result {
                tracing::warn!(
                    node = %mutation.node,
                    fix = %planned.fix,
                    kind = %mutation.kind,
                    error = %err,
                    "mutation failed"
                );
                failed = Some((planned, err));
                break;
            }

            snapshot = next;
            if let Some(journal) = journal.as_deref_mut() {
                journal.record(&planned.fix, &mutation, mode)?;
            }
            tracing::debug!(
                node = %mutation.node,
                fix = %planned.fix,
                kind = %mutation.kind,
                %mode,
                "applied"
            );
            applied.push(PlannedMutation {
                fix: planned.fix,
                mutation,
            });
        }

        let skipped: Vec<PlannedMutation> = pending.collect();
        let status = if failed.is_some() {
            OutcomeStatus::Partial
        } else if applied.is_empty() {
            OutcomeStatus::Unchanged
        } else {
            OutcomeStatus::Complete
        };
        Ok(ExecutionOutcome {
            node: node.iri.clone(),
            final_iri: snapshot.iri,
            mode,
            status,
            applied,
            failed,
            skipped,
        })
    }

    fn dispatch(&self, m: &Mutation) -> Result<(), ExecutionError> {
        let result = match m.kind {
            MutationKind::FieldAdd => {
                let value = required(m, &m.new_value, "new")?;
                self.client.add_field(&m.node, &m.key, value)
            }
            MutationKind::FieldRemove => {
                self.client
                    .remove_field(&m.node, &m.key, m.old_value.as_ref())
            }
            MutationKind::FieldReplace => {
                let value = required(m, &m.new_value, "new")?;
                self.client
                    .replace_field(&m.node, &m.key, m.old_value.as_ref(), value)
            }
            MutationKind::LinkAdd | MutationKind::LinkRemove => {
                let target = m.link_target().ok_or_else(|| missing(m, "target"))?;
                let op = if m.kind == MutationKind::LinkAdd {
                    LinkOp::Add
                } else {
                    LinkOp::Remove
                };
                self.client.apply_link(&m.node, &m.key, &target, op)
            }
            MutationKind::IriReplace => self.client.replace_iri(&m.node, &m.post_iri()),
        };
        result.map_err(|source: GraphError| ExecutionError::Graph {
            node: m.node.clone(),
            kind: m.kind,
            source,
        })
    }
}

fn missing(m: &Mutation, side: &'static str) -> ExecutionError {
    ExecutionError::Precondition(PreconditionError::MissingValue {
        node: m.node.clone(),
        kind: m.kind,
        side,
    })
}

fn required<'m>(
    m: &Mutation,
    value: &'m Option<FieldValue>,
    side: &'static str,
) -> Result<&'m FieldValue, ExecutionError> {
    value.as_ref().ok_or_else(|| missing(m, side))
}
