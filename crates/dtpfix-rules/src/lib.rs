//! # dtpfix-rules
//!
//! The fix rule catalogue. Every rule is a pure function from a node snapshot
//! to the mutations that would bring it into shape; rules never touch the store.
//!
//! Rules are registered in one static table keyed by `(ontology, level)` and
//! addressed by id or group alias:
//!
//! | ontology | level          | id                       | group        |
//! |----------|----------------|--------------------------|--------------|
//! | b2t      | element        | `add-asDesigned`         | `asdesigned` |
//! | b2t      | element        | `remove-ifc-class-field` | `type`       |
//! | b2t      | element        | `add-element-type-link`  | `type`       |
//! | b2t      | element        | `fix-iri`                | `iri`        |
//! | b2t      | task, activity | `remove-task-type-field` | `type`       |
//! | b2t      | task, activity | `add-task-type-link`     | `type`       |
//! | dtc      | element        | `migrate-asDesigned`     | `asdesigned` |
//! | dtc      | element        | `remove-progress`        | `progress`   |

mod b2t;
mod dtc;
pub mod type_map;
pub mod vocabulary;

pub use type_map::{ElementTypeMap, TypeMapError, TypeMapping};
pub use vocabulary::{terms, Ontology, Vocabulary, B2T_BASE_URL, DTC_BASE_URL, IFC_CLASS_FIELD};

use dtpfix_core::{Mutation, NodeRecord, NodeRef, NodeType, OntologyLevel};

/// Fix id that selects every rule of an `(ontology, level)` pair.
pub const ALL_FIXES: &str = "all";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("{node}: IFC class `{class}` has no entry in the element type map")]
    UnknownElementType { node: NodeRef, class: String },
    #[error("{node}: field `{key}` is malformed: {reason}")]
    MalformedField {
        node: NodeRef,
        key: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fix `{fix}` for ontology {ontology} (known: {known})")]
pub struct UnknownFix {
    pub ontology: Ontology,
    pub fix: String,
    pub known: String,
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub node: &'a NodeRecord,
    pub node_type: NodeType,
    pub vocabulary: &'a Vocabulary,
    pub type_map: &'a ElementTypeMap,
}

pub type RuleFn = fn(&RuleInput<'_>) -> Result<Vec<Mutation>, RuleEvaluationError>;

#[derive(Debug, Clone, Copy)]
pub struct FixRule {
    pub id: &'static str,
    pub group: &'static str,
    pub ontology: Ontology,
    pub levels: &'static [OntologyLevel],
    /// Provenance types the rule applies to.
    pub node_types: &'static [NodeType],
    pub description: &'static str,
    apply: RuleFn,
}

impl FixRule {
    pub fn applies_to(&self, node_type: NodeType) -> bool {
        self.node_types.contains(&node_type)
    }

    /// Mutations that bring `input.node` into the fixed state. Empty when the
    /// node is already fixed or the rule does not apply to its provenance.
    pub fn evaluate(&self, input: &RuleInput<'_>) -> Result<Vec<Mutation>, RuleEvaluationError> {
        if !self.applies_to(input.node_type) {
            return Ok(Vec::new());
        }
        (self.apply)(input)
    }

    fn matches(&self, fix_id: &str) -> bool {
        fix_id == ALL_FIXES || fix_id == self.id || fix_id == self.group
    }
}

const BOTH: &[NodeType] = &[NodeType::AsBuilt, NodeType::AsDesigned];
const ELEMENT: &[OntologyLevel] = &[OntologyLevel::Element];
const TASK_AND_ACTIVITY: &[OntologyLevel] = &[OntologyLevel::Task, OntologyLevel::Activity];

static CATALOGUE: &[FixRule] = &[
    FixRule {
        id: "add-asDesigned",
        group: "asdesigned",
        ontology: Ontology::B2t,
        levels: ELEMENT,
        node_types: BOTH,
        description: "add the isAsDesigned flag where it is missing",
        apply: b2t::add_as_designed,
    },
    FixRule {
        id: "remove-ifc-class-field",
        group: "type",
        ontology: Ontology::B2t,
        levels: ELEMENT,
        node_types: BOTH,
        description: "drop the literal IFC class field once its type resolves",
        apply: b2t::remove_ifc_class_field,
    },
    FixRule {
        id: "add-element-type-link",
        group: "type",
        ontology: Ontology::B2t,
        levels: ELEMENT,
        node_types: BOTH,
        description: "link the element to its ontology element type",
        apply: b2t::add_element_type_link,
    },
    FixRule {
        id: "fix-iri",
        group: "iri",
        ontology: Ontology::B2t,
        levels: ELEMENT,
        node_types: &[NodeType::AsBuilt],
        description: "rewrite /as_builtifc- IRIs to /as_built-",
        apply: b2t::fix_iri,
    },
    FixRule {
        id: "remove-task-type-field",
        group: "type",
        ontology: Ontology::B2t,
        levels: TASK_AND_ACTIVITY,
        node_types: BOTH,
        description: "drop the literal task type field",
        apply: b2t::remove_task_type_field,
    },
    FixRule {
        id: "add-task-type-link",
        group: "type",
        ontology: Ontology::B2t,
        levels: TASK_AND_ACTIVITY,
        node_types: BOTH,
        description: "link the task to its task type",
        apply: b2t::add_task_type_link,
    },
    FixRule {
        id: "migrate-asDesigned",
        group: "asdesigned",
        ontology: Ontology::Dtc,
        levels: ELEMENT,
        node_types: BOTH,
        description: "move the legacy B2T isAsDesigned flag to the DTC term",
        apply: dtc::migrate_as_designed,
    },
    FixRule {
        id: "remove-progress",
        group: "progress",
        ontology: Ontology::Dtc,
        levels: ELEMENT,
        node_types: &[NodeType::AsDesigned],
        description: "as-designed elements carry no progress",
        apply: dtc::remove_progress,
    },
];

/// Every registered rule, in catalogue order.
pub fn catalogue() -> &'static [FixRule] {
    CATALOGUE
}

/// Ids and group aliases accepted for `ontology`, plus `all`.
pub fn known_fix_ids(ontology: Ontology) -> Vec<&'static str> {
    let mut ids = vec![ALL_FIXES];
    for rule in CATALOGUE.iter().filter(|r| r.ontology == ontology) {
        for id in [rule.id, rule.group] {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Checks that `fix_id` names something in `ontology`'s catalogue.
pub fn validate_fix_id(ontology: Ontology, fix_id: &str) -> Result<(), UnknownFix> {
    let known = known_fix_ids(ontology);
    if known.contains(&fix_id) {
        Ok(())
    } else {
        Err(UnknownFix {
            ontology,
            fix: fix_id.to_string(),
            known: known.join(", "),
        })
    }
}

/// Rules registered for `(ontology, level)` that `fix_id` selects, in
/// catalogue order. A known fix with no rule at this level yields an empty list.
pub fn rules_for(
    ontology: Ontology,
    level: OntologyLevel,
    fix_id: &str,
) -> Result<Vec<&'static FixRule>, UnknownFix> {
    validate_fix_id(ontology, fix_id)?;
    Ok(CATALOGUE
        .iter()
        .filter(|r| r.ontology == ontology && r.levels.contains(&level) && r.matches(fix_id))
        .collect())
}
