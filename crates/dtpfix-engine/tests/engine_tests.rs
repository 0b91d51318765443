//! Fix runs and reverts against the in-memory graph.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dtpfix_core::{
    FieldValue, GraphClient, GraphError, LinkOp, MemoryGraph, MutationKind, NodePage, NodeRecord,
    NodeRef, NodeType, OntologyLevel, Target,
};
use dtpfix_engine::{read_session, select, Engine, FixContext, Mode, RunError, SkipReason};
use dtpfix_rules::{terms, ElementTypeMap, Ontology, Vocabulary, IFC_CLASS_FIELD};
use proptest::prelude::*;
use serde_json::json;

const WALL: &str = "https://www.bim2twin.eu/ontology/Core#Wall";
const SLAB: &str = "https://www.bim2twin.eu/ontology/Core#Slab";

fn b2t_context(log_dir: &Path) -> FixContext {
    FixContext::new(Ontology::B2t, log_dir)
        .with_element_type_map(
            ElementTypeMap::new()
                .with("IfcWall", WALL)
                .with("IfcSlab", SLAB)
                .with("IfcOpeningElement", "ignore"),
        )
        .with_page_size(3)
}

fn as_designed_key() -> String {
    Vocabulary::b2t().iri(terms::IS_AS_DESIGNED)
}

fn element_type_key() -> String {
    Vocabulary::b2t().iri(terms::HAS_ELEMENT_TYPE)
}

fn insert_element(graph: &MemoryGraph, node_type: NodeType, record: NodeRecord) {
    graph.insert(OntologyLevel::Element, &[node_type], record);
}

fn task_type_key() -> String {
    Vocabulary::b2t().iri(terms::HAS_TASK_TYPE)
}

#[test]
fn as_built_element_gets_three_fixes_and_reverts() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    let iri = NodeRef::from("https://dtp.example/as_built-7");
    let before = NodeRecord::new(iri.clone()).with_field(IFC_CLASS_FIELD, "IfcWall");
    insert_element(&graph, NodeType::AsBuilt, before.clone());

    let engine = Engine::new(&ctx, &graph);
    let report = engine
        .run_fixes(
            Target::Only(OntologyLevel::Element),
            Target::All,
            "all",
            false,
        )
        .unwrap();

    let fixed = graph.get(&iri).unwrap();
    assert_eq!(fixed.field(&as_designed_key()), Some(&json!(false)));
    assert!(!fixed.has_field(IFC_CLASS_FIELD));
    assert!(fixed.has_link(&element_type_key(), &NodeRef::from(WALL)));

    let entries = read_session(&report.session_file).unwrap().entries;
    let kinds: Vec<MutationKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MutationKind::FieldAdd,
            MutationKind::FieldRemove,
            MutationKind::LinkAdd
        ]
    );
    assert!(entries.iter().all(|e| e.mode == Mode::Real));
    assert_eq!(report.nodes_changed, 1);
    assert_eq!(report.totals().applied, 3);

    let revert = engine.run_revert(&report.session_file).unwrap();
    assert_eq!(revert.applied.len(), 3);
    assert!(revert.is_clean());
    assert_eq!(graph.get(&iri).unwrap(), before);
}

#[test]
fn legacy_iri_is_fixed_last_and_reverted_first() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    let old = NodeRef::from("https://dtp.example/as_builtifc-9");
    let before = NodeRecord::new(old.clone()).with_field(IFC_CLASS_FIELD, "IfcSlab");
    insert_element(&graph, NodeType::AsBuilt, before.clone());
    // Another node links to the one being renamed.
    insert_element(
        &graph,
        NodeType::AsDesigned,
        NodeRecord::new("https://dtp.example/design-1")
            .with_field(as_designed_key(), true)
            .with_link("https://dtp.example/realizedBy", old.clone()),
    );

    let engine = Engine::new(&ctx, &graph);
    let report = engine
        .run_fixes(Target::All, Target::All, "all", false)
        .unwrap();
    let entries = read_session(&report.session_file).unwrap().entries;
    assert_eq!(entries.last().unwrap().kind, MutationKind::IriReplace);
    assert_eq!(
        entries.last().unwrap().post_iri,
        Some(NodeRef::from("https://dtp.example/as_built-9"))
    );
    assert!(graph.get(&old).is_none());

    let revert = engine.run_revert(dir.path()).unwrap();
    assert!(revert.is_clean(), "{:?}", revert);
    assert_eq!(graph.get(&old).unwrap(), before);
    let design = graph
        .get(&NodeRef::from("https://dtp.example/design-1"))
        .unwrap();
    assert!(design.has_link("https://dtp.example/realizedBy", &old));
}

#[test]
fn task_and_activity_types_become_links_and_revert() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    let pour = NodeRef::from("https://dtp.example/types/Pour");
    let task = NodeRecord::new("https://dtp.example/task-1")
        .with_field(task_type_key(), pour.as_str());
    let activity = NodeRecord::new("https://dtp.example/activity-1")
        .with_field(task_type_key(), pour.as_str())
        .with_field(as_designed_key(), true);
    graph.insert(OntologyLevel::Task, &[NodeType::AsDesigned], task.clone());
    graph.insert(OntologyLevel::Activity, &[NodeType::AsBuilt], activity.clone());
    let original = graph.snapshot();

    let engine = Engine::new(&ctx, &graph);
    let report = engine
        .run_fixes(Target::All, Target::All, "type", false)
        .unwrap();
    assert!(!report.has_failures());
    assert_eq!(report.nodes_changed, 2);
    assert_eq!(report.fixes["remove-task-type-field"].applied, 2);
    assert_eq!(report.fixes["add-task-type-link"].applied, 2);

    for node in [&task, &activity] {
        let fixed = graph.get(&node.iri).unwrap();
        assert!(!fixed.has_field(&task_type_key()));
        assert!(fixed.has_link(&task_type_key(), &pour));
    }
    let activity_after = graph.get(&activity.iri).unwrap();
    assert_eq!(activity_after.field(&as_designed_key()), Some(&json!(true)));

    let entries = read_session(&report.session_file).unwrap().entries;
    let kinds: Vec<MutationKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MutationKind::FieldRemove,
            MutationKind::LinkAdd,
            MutationKind::FieldRemove,
            MutationKind::LinkAdd
        ]
    );

    let revert = engine.run_revert(dir.path()).unwrap();
    assert!(revert.is_clean(), "{:?}", revert);
    assert_eq!(revert.applied.len(), 4);
    assert_eq!(graph.snapshot(), original);
}

#[test]
fn simulation_leaves_store_untouched_and_is_not_reverted() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    insert_element(
        &graph,
        NodeType::AsBuilt,
        NodeRecord::new("https://dtp.example/as_builtifc-1").with_field(IFC_CLASS_FIELD, "IfcWall"),
    );
    let before = graph.snapshot();

    let engine = Engine::new(&ctx, &graph);
    let report = engine
        .run_fixes(Target::All, Target::All, "all", true)
        .unwrap();
    assert_eq!(report.mode, Mode::Simulated);
    assert_eq!(report.totals().applied, 4);
    assert_eq!(graph.write_count(), 0);
    assert_eq!(graph.snapshot(), before);

    let entries = read_session(&report.session_file).unwrap().entries;
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.is_simulated()));

    let revert = engine.run_revert(&report.session_file).unwrap();
    assert!(revert.applied.is_empty());
    assert!(revert
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::Simulated));
    assert_eq!(graph.write_count(), 0);
}

#[test]
fn rule_errors_are_isolated_to_their_node() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    insert_element(
        &graph,
        NodeType::AsBuilt,
        NodeRecord::new("https://dtp.example/as_built-1").with_field(IFC_CLASS_FIELD, "IfcDoor"),
    );
    insert_element(
        &graph,
        NodeType::AsBuilt,
        NodeRecord::new("https://dtp.example/as_built-2").with_field(IFC_CLASS_FIELD, "IfcWall"),
    );

    let report = Engine::new(&ctx, &graph)
        .run_fixes(Target::All, Target::All, "type", false)
        .unwrap();
    assert_eq!(report.rule_errors.len(), 1);
    assert_eq!(report.rule_errors[0].node.as_str(), "https://dtp.example/as_built-1");
    assert_eq!(report.fixes["remove-ifc-class-field"].failed, 1);
    assert_eq!(report.fixes["add-element-type-link"].applied, 1);
    let untouched = graph
        .get(&NodeRef::from("https://dtp.example/as_built-1"))
        .unwrap();
    assert!(untouched.has_field(IFC_CLASS_FIELD));
}

#[test]
fn unknown_fix_fails_before_any_session_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    let err = Engine::new(&ctx, &graph)
        .run_fixes(Target::All, Target::All, "remove-progress", false)
        .unwrap_err();
    assert!(matches!(err, RunError::UnknownFix(_)));
    assert!(!ctx.sessions_dir().exists());
}

#[test]
fn dtc_task_level_has_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = FixContext::new(Ontology::Dtc, dir.path());
    let graph = MemoryGraph::new();
    graph.insert(
        OntologyLevel::Task,
        &[NodeType::AsDesigned],
        NodeRecord::new("https://dtp.example/task-1"),
    );
    let report = Engine::new(&ctx, &graph)
        .run_fixes(Target::Only(OntologyLevel::Task), Target::All, "all", false)
        .unwrap();
    assert!(report.fixes.is_empty());
    assert_eq!(report.nodes_visited, 0);
}

#[test]
fn selection_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    graph.fail_queries_for(OntologyLevel::Element, NodeType::AsBuilt);
    let err = Engine::new(&ctx, &graph)
        .run_fixes(Target::All, Target::All, "all", false)
        .unwrap_err();
    assert!(matches!(err, RunError::Selection(_)));
}

#[test]
fn stop_flag_ends_the_run_between_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = MemoryGraph::new();
    insert_element(
        &graph,
        NodeType::AsBuilt,
        NodeRecord::new("https://dtp.example/as_built-1"),
    );

    let stop = Arc::new(AtomicBool::new(false));
    stop.store(true, Ordering::SeqCst);
    let report = Engine::new(&ctx, &graph)
        .with_stop_flag(stop)
        .run_fixes(Target::All, Target::All, "all", false)
        .unwrap();
    assert!(report.stopped_early);
    assert_eq!(report.nodes_visited, 0);
    assert_eq!(graph.write_count(), 0);
}

// ============================================================================
// Partial failure
// ============================================================================

/// Delegates to a [`MemoryGraph`] but refuses every link write.
struct LinkRejectingGraph(MemoryGraph);

impl GraphClient for LinkRejectingGraph {
    fn fetch(&self, iri: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        self.0.fetch(iri)
    }

    fn fetch_by_level_and_type(
        &self,
        level: OntologyLevel,
        node_type: NodeType,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<NodePage, GraphError> {
        self.0
            .fetch_by_level_and_type(level, node_type, cursor, page_size)
    }

    fn add_field(&self, iri: &NodeRef, key: &str, value: &FieldValue) -> Result<(), GraphError> {
        self.0.add_field(iri, key, value)
    }

    fn remove_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
    ) -> Result<(), GraphError> {
        self.0.remove_field(iri, key, previous)
    }

    fn replace_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
        value: &FieldValue,
    ) -> Result<(), GraphError> {
        self.0.replace_field(iri, key, previous, value)
    }

    fn apply_link(
        &self,
        _iri: &NodeRef,
        _predicate: &str,
        _target: &NodeRef,
        _op: LinkOp,
    ) -> Result<(), GraphError> {
        Err(GraphError::Transport("connection reset".to_string()))
    }

    fn replace_iri(&self, old: &NodeRef, new: &NodeRef) -> Result<(), GraphError> {
        self.0.replace_iri(old, new)
    }
}

#[test]
fn partial_failure_journals_what_succeeded() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = b2t_context(dir.path());
    let graph = LinkRejectingGraph(MemoryGraph::new());
    let iri = NodeRef::from("https://dtp.example/as_builtifc-3");
    let before = NodeRecord::new(iri.clone()).with_field(IFC_CLASS_FIELD, "IfcWall");
    insert_element(&graph.0, NodeType::AsBuilt, before.clone());

    let engine = Engine::new(&ctx, &graph);
    let report = engine
        .run_fixes(Target::All, Target::All, "all", false)
        .unwrap();
    assert_eq!(report.execution_errors.len(), 1);
    assert_eq!(report.fixes["add-element-type-link"].failed, 1);
    assert_eq!(report.fixes["fix-iri"].skipped, 1);

    let entries = read_session(&report.session_file).unwrap().entries;
    let kinds: Vec<MutationKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![MutationKind::FieldAdd, MutationKind::FieldRemove]);

    let revert = engine.run_revert(&report.session_file).unwrap();
    assert!(revert.is_clean());
    assert_eq!(graph.0.get(&iri).unwrap(), before);
}

// ============================================================================
// Properties
// ============================================================================

fn b2t_element() -> impl Strategy<Value = (NodeType, NodeRecord)> {
    (
        prop_oneof![Just(NodeType::AsBuilt), Just(NodeType::AsDesigned)],
        any::<bool>(),
        proptest::option::of(any::<bool>()),
        proptest::option::of(prop_oneof![
            Just("IfcWall"),
            Just("IfcSlab"),
            Just("IfcOpeningElement")
        ]),
    )
        .prop_map(|(node_type, legacy, flag, class)| {
            let prefix = if legacy { "as_builtifc" } else { "as_built" };
            let mut node = NodeRecord::new(format!("https://dtp.example/{prefix}-1"));
            if let Some(flag) = flag {
                node = node.with_field(as_designed_key(), flag);
            }
            if let Some(class) = class {
                node = node.with_field(IFC_CLASS_FIELD, class);
            }
            (node_type, node)
        })
}

/// A task or activity node, optionally carrying a literal task type and
/// optionally already linked to it.
fn b2t_task() -> impl Strategy<Value = (OntologyLevel, NodeType, NodeRecord)> {
    (
        prop_oneof![Just(OntologyLevel::Task), Just(OntologyLevel::Activity)],
        prop_oneof![Just(NodeType::AsBuilt), Just(NodeType::AsDesigned)],
        proptest::option::of(prop_oneof![
            Just("https://dtp.example/types/Pour"),
            Just("https://dtp.example/types/Formwork")
        ]),
        any::<bool>(),
    )
        .prop_map(|(level, node_type, task_type, linked)| {
            let mut node = NodeRecord::new("https://dtp.example/task-1");
            if let Some(task_type) = task_type {
                node = node.with_field(task_type_key(), task_type);
            }
            if linked {
                node = node.with_link(task_type_key(), "https://dtp.example/types/Pour");
            }
            (level, node_type, node)
        })
}

fn b2t_node() -> impl Strategy<Value = (OntologyLevel, NodeType, NodeRecord)> {
    prop_oneof![
        b2t_element().prop_map(|(node_type, node)| (OntologyLevel::Element, node_type, node)),
        b2t_task(),
    ]
}

fn level_strategy() -> impl Strategy<Value = OntologyLevel> {
    prop_oneof![
        Just(OntologyLevel::Element),
        Just(OntologyLevel::Task),
        Just(OntologyLevel::Activity)
    ]
}

fn types_strategy() -> impl Strategy<Value = Vec<NodeType>> {
    prop_oneof![
        Just(vec![NodeType::AsBuilt]),
        Just(vec![NodeType::AsDesigned]),
        Just(vec![NodeType::AsBuilt, NodeType::AsDesigned]),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn fix_then_revert_restores_the_node((level, node_type, before) in b2t_node()) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = b2t_context(dir.path());
        let graph = MemoryGraph::new();
        graph.insert(level, &[node_type], before);
        let original = graph.snapshot();

        let engine = Engine::new(&ctx, &graph);
        let report = engine.run_fixes(Target::All, Target::All, "all", false).unwrap();
        prop_assert!(!report.has_failures());

        let revert = engine.run_revert(&report.session_file).unwrap();
        prop_assert!(revert.is_clean());
        prop_assert_eq!(graph.snapshot(), original);
    }

    #[test]
    fn all_all_selects_the_exact_union(
        nodes in proptest::collection::vec((level_strategy(), types_strategy()), 0..24),
        page_size in 1usize..5,
    ) {
        let graph = MemoryGraph::new();
        for (i, (level, types)) in nodes.iter().enumerate() {
            graph.insert(*level, types, NodeRecord::new(format!("https://dtp.example/n{i:02}")));
        }

        let all: Vec<NodeRef> = select(&graph, Target::All, Target::All, page_size)
            .map(|r| r.unwrap().record.iri)
            .collect();
        let unique: BTreeSet<NodeRef> = all.iter().cloned().collect();
        prop_assert_eq!(unique.len(), all.len());

        let mut union = HashSet::new();
        for level in [OntologyLevel::Element, OntologyLevel::Task, OntologyLevel::Activity] {
            for node_type in [NodeType::AsBuilt, NodeType::AsDesigned] {
                for item in select(&graph, Target::Only(level), Target::Only(node_type), page_size) {
                    union.insert(item.unwrap().record.iri);
                }
            }
        }
        prop_assert_eq!(union.into_iter().collect::<BTreeSet<_>>(), unique);
        prop_assert_eq!(all.len(), nodes.len());
    }
}
