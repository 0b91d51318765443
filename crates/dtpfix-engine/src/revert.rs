//! Revert engine: replays journal entries backwards as inverse mutations.
//!
//! Every entry is checked against the store before it is undone. If the
//! recorded effect no longer holds, someone else changed the node since, and
//! the entry is skipped with a [`RevertConflict`] instead of clobbering the
//! newer edit.
//!
//! Entries are addressed to the IRI the node had when they were written. A
//! rename that cannot be undone leaves the node at its new IRI; it is then
//! added to a rename map so older entries for the same node still find it.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dtpfix_core::{GraphClient, Mutation, MutationKind, NodeRecord, NodeRef};

use crate::error::{JournalError, RevertConflict};
use crate::executor::{Executor, Mode, PlannedMutation};
use crate::journal::{read_session, session_files, SessionEntry};

/// Identifies one journal entry in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRef {
    pub session_id: uuid::Uuid,
    pub seq: u64,
    pub fix: String,
    pub node: NodeRef,
    pub kind: MutationKind,
    pub key: String,
}

impl From<&SessionEntry> for EntryRef {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            session_id: entry.session_id,
            seq: entry.seq,
            fix: entry.fix.clone(),
            node: entry.node.clone(),
            kind: entry.kind,
            key: entry.key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Recorded by a dry run; nothing to undo.
    Simulated,
    Conflict { conflict: RevertConflict },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Simulated => f.write_str("simulated"),
            SkipReason::Conflict { conflict } => write!(f, "conflict: {conflict}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    pub entry: EntryRef,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntry {
    pub entry: EntryRef,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevertReport {
    pub files: Vec<PathBuf>,
    pub applied: Vec<EntryRef>,
    pub skipped: Vec<SkippedEntry>,
    pub failed: Vec<FailedEntry>,
}

impl RevertReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self
                .skipped
                .iter()
                .all(|s| s.reason == SkipReason::Simulated)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Conflict { .. }))
    }
}

enum Step {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

pub struct RevertEngine<'g, G: GraphClient + ?Sized> {
    client: &'g G,
}

impl<'g, G: GraphClient + ?Sized> RevertEngine<'g, G> {
    pub fn new(client: &'g G) -> Self {
        Self { client }
    }

    /// Reverts every session addressed by `path` (a file or a log directory).
    /// Files are read oldest to newest and the combined sequence is undone
    /// newest first.
    pub fn revert_path(&self, path: &Path) -> Result<RevertReport, JournalError> {
        let files = session_files(path)?;
        let mut entries = Vec::new();
        for file in &files {
            let log = read_session(file)?;
            tracing::info!(
                path = %file.display(),
                entries = log.entries.len(),
                "loaded session"
            );
            entries.extend(log.entries);
        }
        let mut report = self.revert_entries(&entries);
        report.files = files;
        Ok(report)
    }

    /// Undoes `entries`, given in the order they were written.
    pub fn revert_entries(&self, entries: &[SessionEntry]) -> RevertReport {
        self.replay(entries.iter().rev())
    }

    /// Undoes entries in exactly the order given.
    pub fn replay<'e>(&self, entries: impl Iterator<Item = &'e SessionEntry>) -> RevertReport {
        let mut renames: HashMap<NodeRef, NodeRef> = HashMap::new();
        let mut report = RevertReport::default();
        for entry in entries {
            let entry_ref = EntryRef::from(entry);
            match self.revert_one(entry, &mut renames) {
                Step::Applied => {
                    tracing::debug!(
                        node = %entry.node,
                        seq = entry.seq,
                        kind = %entry.kind,
                        "reverted"
                    );
                    report.applied.push(entry_ref);
                }
                Step::Skipped(reason) => {
                    if reason != SkipReason::Simulated {
                        tracing::warn!(
                            node = %entry.node,
                            seq = entry.seq,
                            %reason,
                            "revert skipped"
                        );
                    }
                    report.skipped.push(SkippedEntry {
                        entry: entry_ref,
                        reason,
                    });
                }
                Step::Failed(error) => {
                    tracing::warn!(node = %entry.node, seq = entry.seq, %error, "revert failed");
                    report.failed.push(FailedEntry {
                        entry: entry_ref,
                        error,
                    });
                }
            }
        }
        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "revert finished"
        );
        report
    }

    fn revert_one(&self, entry: &SessionEntry, renames: &mut HashMap<NodeRef, NodeRef>) -> Step {
        if entry.is_simulated() {
            return Step::Skipped(SkipReason::Simulated);
        }
        let forward = entry.mutation();

        if forward.kind == MutationKind::IriReplace {
            let current = resolve(renames, &forward.post_iri());
            let step = self.revert_rename(entry, &forward, &current);
            if !matches!(step, Step::Applied) {
                // The node stays at `current`.
                renames.insert(forward.node.clone(), current);
            }
            return step;
        }

        let current = resolve(renames, &forward.node);
        let record = match self.fetch_conflict_checked(&current) {
            Ok(record) => record,
            Err(step) => return step,
        };
        let inverse = match inverse_at(&forward, &current, renames) {
            Ok(inverse) => inverse,
            Err(c) => return conflict(c),
        };
        if let Err(c) = effect_holds(&forward, &inverse, &record) {
            return conflict(c);
        }
        self.apply_inverse(entry, &record, inverse)
    }

    fn revert_rename(&self, entry: &SessionEntry, forward: &Mutation, current: &NodeRef) -> Step {
        let record = match self.fetch_conflict_checked(current) {
            Ok(record) => record,
            Err(step) => return step,
        };
        match self.client.fetch(&forward.node) {
            Ok(None) => {}
            Ok(Some(_)) => {
                return conflict(RevertConflict::IriOccupied {
                    node: current.clone(),
                    iri: forward.node.clone(),
                })
            }
            Err(e) => return Step::Failed(e.to_string()),
        }
        self.apply_inverse(entry, &record, Mutation::iri_replace(current, &forward.node))
    }

    fn apply_inverse(&self, entry: &SessionEntry, record: &NodeRecord, inverse: Mutation) -> Step {
        let outcome = Executor::new(self.client).apply(
            record,
            vec![PlannedMutation::new(entry.fix.clone(), inverse)],
            Mode::Real,
            None,
        );
        match outcome {
            Ok(outcome) => match outcome.failed {
                Some((_, err)) => Step::Failed(err.to_string()),
                None => Step::Applied,
            },
            Err(e) => Step::Failed(e.to_string()),
        }
    }

    fn fetch_conflict_checked(&self, iri: &NodeRef) -> Result<NodeRecord, Step> {
        match self.client.fetch(iri) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(conflict(RevertConflict::NodeMissing { node: iri.clone() })),
            Err(e) => Err(Step::Failed(e.to_string())),
        }
    }
}

fn conflict(c: RevertConflict) -> Step {
    Step::Skipped(SkipReason::Conflict { conflict: c })
}

/// Follows the rename chain starting at `iri`.
fn resolve(renames: &HashMap<NodeRef, NodeRef>, iri: &NodeRef) -> NodeRef {
    let mut current = iri.clone();
    let mut hops = 0;
    while let Some(next) = renames.get(&current) {
        current = next.clone();
        hops += 1;
        if hops > renames.len() {
            break;
        }
    }
    current
}

/// The inverse of a field or link mutation, addressed to the node's current IRI.
fn inverse_at(
    forward: &Mutation,
    current: &NodeRef,
    renames: &HashMap<NodeRef, NodeRef>,
) -> Result<Mutation, RevertConflict> {
    if !forward.kind.is_link() {
        return Ok(forward.inverse().addressed_to(current));
    }
    let target = forward
        .link_target()
        .map(|t| resolve(renames, &t))
        .ok_or_else(|| RevertConflict::Malformed {
            reason: format!("{} entry without a target", forward.kind),
        })?;
    Ok(match forward.kind {
        MutationKind::LinkAdd => Mutation::link_remove(current, forward.key.clone(), &target),
        _ => Mutation::link_add(current, forward.key.clone(), &target),
    })
}

/// Checks that the forward mutation's effect is still visible on `record`.
fn effect_holds(
    forward: &Mutation,
    inverse: &Mutation,
    record: &NodeRecord,
) -> Result<(), RevertConflict> {
    let found = record.field(&forward.key);
    let expected = match forward.kind {
        MutationKind::FieldAdd | MutationKind::FieldReplace => {
            forward.new_value.as_ref().filter(|v| !v.is_null())
        }
        MutationKind::FieldRemove => None,
        MutationKind::LinkAdd | MutationKind::LinkRemove => {
            let expected_present = forward.kind == MutationKind::LinkAdd;
            let target = inverse
                .link_target()
                .ok_or_else(|| RevertConflict::Malformed {
                    reason: format!("{} entry without a target", forward.kind),
                })?;
            if record.has_link(&forward.key, &target) != expected_present {
                return Err(RevertConflict::LinkDrifted {
                    node: record.iri.clone(),
                    predicate: forward.key.clone(),
                    target,
                    expected_present,
                });
            }
            return Ok(());
        }
        MutationKind::IriReplace => return Ok(()),
    };
    if found != expected {
        return Err(RevertConflict::FieldDrifted {
            node: record.iri.clone(),
            key: forward.key.clone(),
            expected: expected.cloned(),
            found: found.cloned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::SessionJournal;
    use dtpfix_core::{MemoryGraph, NodeType, OntologyLevel};
    use dtpfix_rules::Ontology;
    use serde_json::json;

    const OLD: &str = "http://x/as_builtifc-1";
    const NEW: &str = "http://x/as_built-1";

    /// Renames the node, then adds a field under the new IRI.
    fn journaled_session(graph: &MemoryGraph, dir: &Path) -> Vec<SessionEntry> {
        graph.insert(
            OntologyLevel::Element,
            &[NodeType::AsBuilt],
            NodeRecord::new(OLD),
        );
        let mut journal = SessionJournal::create(dir, Ontology::B2t).unwrap();
        let old = NodeRef::from(OLD);
        let new = NodeRef::from(NEW);
        let rename = Mutation::iri_replace(&old, &new);
        let add = Mutation::field_add(&new, "k", json!(1));

        let node = graph.get(&old).unwrap();
        let executor = Executor::new(graph);
        executor
            .apply(
                &node,
                vec![PlannedMutation::new("fix-iri", rename)],
                Mode::Real,
                Some(&mut journal),
            )
            .unwrap();
        let node = graph.get(&new).unwrap();
        executor
            .apply(
                &node,
                vec![PlannedMutation::new("later", add)],
                Mode::Real,
                Some(&mut journal),
            )
            .unwrap();
        read_session(journal.path()).unwrap().entries
    }

    #[test]
    fn reverse_replay_undoes_dependent_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let graph = MemoryGraph::new();
        let entries = journaled_session(&graph, dir.path());

        let report = RevertEngine::new(&graph).revert_entries(&entries);
        assert_eq!(report.applied.len(), 2);
        assert!(report.is_clean());
        assert_eq!(graph.get(&NodeRef::from(OLD)).unwrap(), NodeRecord::new(OLD));
        assert!(graph.get(&NodeRef::from(NEW)).is_none());
    }

    #[test]
    fn forward_replay_produces_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let graph = MemoryGraph::new();
        let entries = journaled_session(&graph, dir.path());

        let report = RevertEngine::new(&graph).replay(entries.iter());
        assert_eq!(report.conflicts().count(), 1);
        assert!(matches!(
            report.conflicts().next().unwrap().reason,
            SkipReason::Conflict {
                conflict: RevertConflict::NodeMissing { .. }
            }
        ));
    }

    #[test]
    fn drifted_field_is_skipped_not_forced() {
        let dir = tempfile::tempdir().unwrap();
        let graph = MemoryGraph::new();
        let entries = journaled_session(&graph, dir.path());
        let new = NodeRef::from(NEW);
        graph.replace_field(&new, "k", None, &json!(2)).unwrap();

        let report = RevertEngine::new(&graph).revert_entries(&entries);
        assert_eq!(report.conflicts().count(), 1);
        // The field stays; the rename is still undone and the field follows the node.
        let restored = graph.get(&NodeRef::from(OLD)).unwrap();
        assert_eq!(restored.field("k"), Some(&json!(2)));
    }

    #[test]
    fn skipped_rename_keeps_earlier_entries_addressable() {
        let dir = tempfile::tempdir().unwrap();
        let graph = MemoryGraph::new();
        graph.insert(
            OntologyLevel::Element,
            &[NodeType::AsBuilt],
            NodeRecord::new(OLD),
        );
        let mut journal = SessionJournal::create(dir.path(), Ontology::B2t).unwrap();
        let old = NodeRef::from(OLD);
        let batch = vec![
            PlannedMutation::new("add-asDesigned", Mutation::field_add(&old, "k", true)),
            PlannedMutation::new(
                "fix-iri",
                Mutation::iri_replace(&old, &NodeRef::from(NEW)),
            ),
        ];
        let node = graph.get(&old).unwrap();
        Executor::new(&graph)
            .apply(&node, batch, Mode::Real, Some(&mut journal))
            .unwrap();
        // Something else now occupies the old address.
        graph.insert(
            OntologyLevel::Element,
            &[NodeType::AsBuilt],
            NodeRecord::new(OLD),
        );

        let entries = read_session(journal.path()).unwrap().entries;
        let report = RevertEngine::new(&graph).revert_entries(&entries);
        assert_eq!(report.applied.len(), 1);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::Conflict {
                conflict: RevertConflict::IriOccupied { .. }
            }
        ));
        assert!(!graph.get(&NodeRef::from(NEW)).unwrap().has_field("k"));
    }

    #[test]
    fn entries_for_a_reused_iri_stay_on_the_node_that_holds_it() {
        let dir = tempfile::tempdir().unwrap();
        let graph = MemoryGraph::new();
        let old = NodeRef::from(OLD);
        let new = NodeRef::from(NEW);
        graph.insert(
            OntologyLevel::Element,
            &[NodeType::AsBuilt],
            NodeRecord::new(OLD),
        );
        let mut journal = SessionJournal::create(dir.path(), Ontology::B2t).unwrap();
        let executor = Executor::new(&graph);
        let first = vec![
            PlannedMutation::new("add-asDesigned", Mutation::field_add(&old, "k", 1)),
            PlannedMutation::new("fix-iri", Mutation::iri_replace(&old, &new)),
        ];
        executor
            .apply(&graph.get(&old).unwrap(), first, Mode::Real, Some(&mut journal))
            .unwrap();

        // A fresh node is imported under the old IRI and fixed in turn.
        let reimported = NodeRecord::new(OLD).with_field("other", "x");
        graph.insert(OntologyLevel::Element, &[NodeType::AsBuilt], reimported.clone());
        let second = vec![PlannedMutation::new(
            "add-asDesigned",
            Mutation::field_add(&old, "k", 2),
        )];
        executor
            .apply(&reimported, second, Mode::Real, Some(&mut journal))
            .unwrap();

        let entries = read_session(journal.path()).unwrap().entries;
        let report = RevertEngine::new(&graph).revert_entries(&entries);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.conflicts().count(), 1);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::Conflict {
                conflict: RevertConflict::IriOccupied { .. }
            }
        ));
        assert_eq!(graph.get(&old).unwrap(), reimported);
        assert_eq!(graph.get(&new).unwrap(), NodeRecord::new(NEW));
    }
}
