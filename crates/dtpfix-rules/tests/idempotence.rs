//! A node brought into shape by a full pass yields no further mutations.

use dtpfix_core::{Mutation, NodeRecord, NodeType, OntologyLevel};
use dtpfix_rules::{
    rules_for, terms, ElementTypeMap, Ontology, RuleInput, Vocabulary, IFC_CLASS_FIELD,
};
use proptest::prelude::*;
use serde_json::json;

fn type_map() -> ElementTypeMap {
    ElementTypeMap::new()
        .with("IfcWall", "https://www.bim2twin.eu/ontology/Core#Wall")
        .with("IfcSlab", "https://www.bim2twin.eu/ontology/Core#Slab")
        .with("IfcOpeningElement", "ignore")
}

fn plan(
    ontology: Ontology,
    level: OntologyLevel,
    node: &NodeRecord,
    node_type: NodeType,
    vocabulary: &Vocabulary,
) -> Vec<Mutation> {
    let type_map = type_map();
    let input = RuleInput {
        node,
        node_type,
        vocabulary,
        type_map: &type_map,
    };
    rules_for(ontology, level, "all")
        .unwrap()
        .into_iter()
        .flat_map(|rule| rule.evaluate(&input).unwrap())
        .collect()
}

fn fix_once(
    ontology: Ontology,
    level: OntologyLevel,
    node: &NodeRecord,
    node_type: NodeType,
) -> NodeRecord {
    let vocabulary = Vocabulary::new(ontology);
    let mut fixed = node.clone();
    for m in plan(ontology, level, node, node_type, &vocabulary) {
        m.apply_to(&mut fixed).unwrap();
    }
    fixed
}

fn node_type_strategy() -> impl Strategy<Value = NodeType> {
    prop_oneof![Just(NodeType::AsBuilt), Just(NodeType::AsDesigned)]
}

fn b2t_element() -> impl Strategy<Value = NodeRecord> {
    (
        any::<bool>(),
        proptest::option::of(any::<bool>()),
        proptest::option::of(prop_oneof![
            Just("IfcWall"),
            Just("IfcSlab"),
            Just("IfcOpeningElement")
        ]),
        0u32..1000,
    )
        .prop_map(|(legacy_iri, as_designed, class, n)| {
            let prefix = if legacy_iri { "as_builtifc" } else { "as_built" };
            let mut node = NodeRecord::new(format!("https://dtp.example/{prefix}-{n}"));
            if let Some(flag) = as_designed {
                node = node.with_field(Vocabulary::b2t().iri(terms::IS_AS_DESIGNED), flag);
            }
            if let Some(class) = class {
                node = node.with_field(IFC_CLASS_FIELD, class);
            }
            node
        })
}

fn dtc_element() -> impl Strategy<Value = NodeRecord> {
    (
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
        proptest::option::of(0.0f64..1.0),
    )
        .prop_map(|(legacy, current, progress)| {
            let mut node = NodeRecord::new("https://dtp.example/e-1");
            if let Some(flag) = legacy {
                node = node.with_field(Vocabulary::b2t().iri(terms::IS_AS_DESIGNED), flag);
            }
            if let Some(flag) = current {
                node = node.with_field(Vocabulary::dtc().iri(terms::IS_AS_DESIGNED), flag);
            }
            if let Some(p) = progress {
                node = node.with_field(Vocabulary::dtc().iri(terms::PROGRESS), json!(p));
            }
            node
        })
}

proptest! {
    #[test]
    fn b2t_element_rules_are_idempotent(node in b2t_element(), node_type in node_type_strategy()) {
        let fixed = fix_once(Ontology::B2t, OntologyLevel::Element, &node, node_type);
        let again = plan(Ontology::B2t, OntologyLevel::Element, &fixed, node_type, &Vocabulary::b2t());
        prop_assert!(again.is_empty(), "second pass produced {:?}", again);
    }

    #[test]
    fn dtc_element_rules_are_idempotent(node in dtc_element(), node_type in node_type_strategy()) {
        let fixed = fix_once(Ontology::Dtc, OntologyLevel::Element, &node, node_type);
        let again = plan(Ontology::Dtc, OntologyLevel::Element, &fixed, node_type, &Vocabulary::dtc());
        prop_assert!(again.is_empty(), "second pass produced {:?}", again);
    }

    #[test]
    fn b2t_task_rules_are_idempotent(has_type in any::<bool>(), node_type in node_type_strategy()) {
        let mut node = NodeRecord::new("https://dtp.example/task-1");
        if has_type {
            node = node.with_field(Vocabulary::b2t().iri(terms::HAS_TASK_TYPE), "https://dtp.example/types/Pour");
        }
        let fixed = fix_once(Ontology::B2t, OntologyLevel::Task, &node, node_type);
        let again = plan(Ontology::B2t, OntologyLevel::Task, &fixed, node_type, &Vocabulary::b2t());
        prop_assert!(again.is_empty());
    }
}
