//! Entry points: one per mode.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dtpfix_core::{GraphClient, MutationKind, NodeType, OntologyLevel, Target};
use dtpfix_rules::{rules_for, validate_fix_id, FixRule, RuleEvaluationError, RuleInput};

use crate::context::FixContext;
use crate::error::RunError;
use crate::executor::{Executor, Mode, PlannedMutation};
use crate::journal::SessionJournal;
use crate::report::RunReport;
use crate::revert::{RevertEngine, RevertReport};
use crate::selector::{select, SelectedNode};

/// Evaluates `rules` on one selected node. Mutations keep catalogue order,
/// except IRI replacements, which move to the end: every other mutation
/// addresses the node by the IRI it had when selected.
pub fn plan_mutations(
    ctx: &FixContext,
    selected: &SelectedNode,
    rules: &[&'static FixRule],
) -> Result<Vec<PlannedMutation>, (&'static str, RuleEvaluationError)> {
    let input = RuleInput {
        node: &selected.record,
        node_type: selected.node_type,
        vocabulary: ctx.vocabulary(),
        type_map: ctx.element_type_map(),
    };
    let mut batch = Vec::new();
    for rule in rules {
        let mutations = rule.evaluate(&input).map_err(|e| (rule.id, e))?;
        batch.extend(mutations.into_iter().map(|m| PlannedMutation::new(rule.id, m)));
    }
    let (mut ordered, renames): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .partition(|p| p.mutation.kind != MutationKind::IriReplace);
    ordered.extend(renames);
    Ok(ordered)
}

pub struct Engine<'a, G: GraphClient + ?Sized> {
    ctx: &'a FixContext,
    client: &'a G,
    stop: Arc<AtomicBool>,
}

impl<'a, G: GraphClient + ?Sized> Engine<'a, G> {
    pub fn new(ctx: &'a FixContext, client: &'a G) -> Self {
        Self {
            ctx,
            client,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a stop flag; once it is set the run ends before the next node.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Selects nodes, evaluates the selected fixes and applies the result,
    /// journaling every mutation. With `simulate` nothing is written to the
    /// store; the journal is still written, tagged `simulated`.
    pub fn run_fixes(
        &self,
        level: Target<OntologyLevel>,
        node_type: Target<NodeType>,
        fix_id: &str,
        simulate: bool,
    ) -> Result<RunReport, RunError> {
        let ontology = self.ctx.ontology();
        let mode = Mode::from_simulate(simulate);
        validate_fix_id(ontology, fix_id)?;

        let mut rules: HashMap<OntologyLevel, Vec<&'static FixRule>> = HashMap::new();
        let mut fix_ids: Vec<&'static str> = Vec::new();
        for l in level.expand() {
            let level_rules = rules_for(ontology, l, fix_id)?;
            for rule in &level_rules {
                if !fix_ids.contains(&rule.id) {
                    fix_ids.push(rule.id);
                }
            }
            rules.insert(l, level_rules);
        }

        let mut journal = SessionJournal::create(self.ctx.log_dir(), ontology)?;
        let mut report = RunReport::new(
            ontology,
            mode,
            journal.session_id(),
            journal.path().to_path_buf(),
            fix_ids.iter().copied(),
        );
        if fix_ids.is_empty() {
            tracing::warn!(
                %ontology,
                %level,
                fix = fix_id,
                "no rules registered for this selection"
            );
            return Ok(report);
        }
        tracing::info!(
            %ontology,
            %level,
            %node_type,
            fix = fix_id,
            %mode,
            session = %journal.session_id(),
            "starting fix run"
        );
        if simulate {
            tracing::info!("simulation: the store will not be modified");
        }

        let executor = Executor::new(self.client);
        for item in select(self.client, level, node_type, self.ctx.page_size()) {
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!(visited = report.nodes_visited, "stop requested, ending run");
                report.stopped_early = true;
                break;
            }
            let selected = item.map_err(|e| {
                tracing::error!(error = %e, "selection failed, aborting run");
                e
            })?;
            report.nodes_visited += 1;

            let level_rules = rules.get(&selected.level).map(Vec::as_slice).unwrap_or(&[]);
            let batch = match plan_mutations(self.ctx, &selected, level_rules) {
                Ok(batch) => batch,
                Err((fix, err)) => {
                    tracing::warn!(
                        node = %selected.record.iri,
                        fix,
                        error = %err,
                        "rule failed, node skipped"
                    );
                    report.record_rule_error(&selected.record.iri, fix, err.to_string());
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            let outcome = executor
                .apply(&selected.record, batch, mode, Some(&mut journal))
                .map_err(|e| {
                    tracing::error!(error = %e, "journal write failed, aborting run");
                    e
                })?;
            report.record_outcome(&outcome);
        }

        let totals = report.totals();
        tracing::info!(
            visited = report.nodes_visited,
            changed = report.nodes_changed,
            applied = totals.applied,
            skipped = totals.skipped,
            failed = totals.failed,
            %mode,
            "fix run finished"
        );
        Ok(report)
    }

    /// Reverts the session file or log directory at `path`.
    pub fn run_revert(&self, path: &Path) -> Result<RevertReport, RunError> {
        tracing::info!(path = %path.display(), "starting revert");
        Ok(RevertEngine::new(self.client).revert_path(path)?)
    }
}
