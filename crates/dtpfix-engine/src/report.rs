//! Run summaries.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use dtpfix_core::NodeRef;
use dtpfix_rules::Ontology;

use crate::executor::{ExecutionOutcome, Mode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixCounts {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A per-node error that did not stop the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFailure {
    pub node: NodeRef,
    pub fix: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub ontology: Ontology,
    pub mode: Mode,
    pub session_id: Uuid,
    pub session_file: PathBuf,
    /// Counts per fix id, for every fix that was selected.
    pub fixes: BTreeMap<String, FixCounts>,
    pub nodes_visited: usize,
    pub nodes_changed: usize,
    pub rule_errors: Vec<NodeFailure>,
    pub execution_errors: Vec<NodeFailure>,
    /// The run was stopped between nodes before selection was exhausted.
    pub stopped_early: bool,
}

impl RunReport {
    pub(crate) fn new(
        ontology: Ontology,
        mode: Mode,
        session_id: Uuid,
        session_file: PathBuf,
        fixes: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            ontology,
            mode,
            session_id,
            session_file,
            fixes: fixes
                .into_iter()
                .map(|f| (f.to_string(), FixCounts::default()))
                .collect(),
            nodes_visited: 0,
            nodes_changed: 0,
            rule_errors: Vec::new(),
            execution_errors: Vec::new(),
            stopped_early: false,
        }
    }

    fn counts(&mut self, fix: &str) -> &mut FixCounts {
        self.fixes.entry(fix.to_string()).or_default()
    }

    pub(crate) fn record_rule_error(&mut self, node: &NodeRef, fix: &str, error: String) {
        self.counts(fix).failed += 1;
        self.rule_errors.push(NodeFailure {
            node: node.clone(),
            fix: fix.to_string(),
            error,
        });
    }

    pub(crate) fn record_outcome(&mut self, outcome: &ExecutionOutcome) {
        for planned in &outcome.applied {
            self.counts(&planned.fix).applied += 1;
        }
        for planned in &outcome.skipped {
            self.counts(&planned.fix).skipped += 1;
        }
        if let Some((planned, err)) = &outcome.failed {
            self.counts(&planned.fix).failed += 1;
            self.execution_errors.push(NodeFailure {
                node: outcome.node.clone(),
                fix: planned.fix.clone(),
                error: err.to_string(),
            });
        }
        if !outcome.applied.is_empty() {
            self.nodes_changed += 1;
        }
    }

    pub fn totals(&self) -> FixCounts {
        self.fixes.values().fold(FixCounts::default(), |acc, c| FixCounts {
            applied: acc.applied + c.applied,
            skipped: acc.skipped + c.skipped,
            failed: acc.failed + c.failed,
        })
    }

    pub fn has_failures(&self) -> bool {
        !self.rule_errors.is_empty() || !self.execution_errors.is_empty()
    }
}
