//! BIM2TWIN rules.

use dtpfix_core::{FieldValue, Mutation, NodeRef};

use crate::type_map::TypeMapping;
use crate::vocabulary::{terms, IFC_CLASS_FIELD};
use crate::{RuleEvaluationError, RuleInput};

const LEGACY_AS_BUILT_SEGMENT: &str = "/as_builtifc-";
const AS_BUILT_SEGMENT: &str = "/as_built-";

pub(crate) fn add_as_designed(input: &RuleInput<'_>) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let key = input.vocabulary.iri(terms::IS_AS_DESIGNED);
    if input.node.has_field(&key) {
        return Ok(Vec::new());
    }
    Ok(vec![Mutation::field_add(
        &input.node.iri,
        key,
        input.node_type.is_as_designed(),
    )])
}

/// A literal field that should have been an element-type link.
struct TypeField {
    key: String,
    value: FieldValue,
    target: NodeRef,
}

fn string_field<'a>(
    input: &RuleInput<'a>,
    key: &str,
) -> Result<Option<(&'a FieldValue, &'a str)>, RuleEvaluationError> {
    let Some(value) = input.node.field(key) else {
        return Ok(None);
    };
    match value.as_str() {
        Some(s) => Ok(Some((value, s))),
        None => Err(RuleEvaluationError::MalformedField {
            node: input.node.iri.clone(),
            key: key.to_string(),
            reason: format!("expected a string, found {value}"),
        }),
    }
}

/// Resolves the literal element-type field, if any. `None` when there is no
/// such field or the class is mapped to `ignore`.
fn element_type_field(input: &RuleInput<'_>) -> Result<Option<TypeField>, RuleEvaluationError> {
    let type_key = input.vocabulary.iri(terms::HAS_ELEMENT_TYPE);
    let found = match string_field(input, IFC_CLASS_FIELD)? {
        Some(found) => Some((IFC_CLASS_FIELD.to_string(), found)),
        None => string_field(input, &type_key)?.map(|found| (type_key, found)),
    };
    let Some((key, (value, class))) = found else {
        return Ok(None);
    };

    let target = if input.vocabulary.is_ontology_iri(class) {
        class.to_string()
    } else {
        match input.type_map.lookup(class) {
            TypeMapping::Target(t) => t.to_string(),
            TypeMapping::Ignore => return Ok(None),
            TypeMapping::Unknown => {
                return Err(RuleEvaluationError::UnknownElementType {
                    node: input.node.iri.clone(),
                    class: class.to_string(),
                })
            }
        }
    };
    Ok(Some(TypeField {
        key,
        value: value.clone(),
        target: NodeRef::from(target),
    }))
}

pub(crate) fn remove_ifc_class_field(
    input: &RuleInput<'_>,
) -> Result<Vec<Mutation>, RuleEvaluationError> {
    Ok(element_type_field(input)?
        .map(|f| vec![Mutation::field_remove(&input.node.iri, f.key, f.value)])
        .unwrap_or_default())
}

pub(crate) fn add_element_type_link(
    input: &RuleInput<'_>,
) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let predicate = input.vocabulary.iri(terms::HAS_ELEMENT_TYPE);
    match element_type_field(input)? {
        Some(f) if !input.node.has_link(&predicate, &f.target) => Ok(vec![Mutation::link_add(
            &input.node.iri,
            predicate,
            &f.target,
        )]),
        _ => Ok(Vec::new()),
    }
}

/// The corrected IRI of an as-built node imported with the legacy prefix.
pub fn fixed_as_built_iri(iri: &str) -> Option<String> {
    iri.contains(LEGACY_AS_BUILT_SEGMENT)
        .then(|| iri.replacen(LEGACY_AS_BUILT_SEGMENT, AS_BUILT_SEGMENT, 1))
}

pub(crate) fn fix_iri(input: &RuleInput<'_>) -> Result<Vec<Mutation>, RuleEvaluationError> {
    Ok(fixed_as_built_iri(input.node.iri.as_str())
        .map(|fixed| vec![Mutation::iri_replace(&input.node.iri, &NodeRef::from(fixed))])
        .unwrap_or_default())
}

pub(crate) fn remove_task_type_field(
    input: &RuleInput<'_>,
) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let key = input.vocabulary.iri(terms::HAS_TASK_TYPE);
    Ok(string_field(input, &key)?
        .map(|(value, _)| vec![Mutation::field_remove(&input.node.iri, key.clone(), value.clone())])
        .unwrap_or_default())
}

pub(crate) fn add_task_type_link(
    input: &RuleInput<'_>,
) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let key = input.vocabulary.iri(terms::HAS_TASK_TYPE);
    let Some((_, task_type)) = string_field(input, &key)? else {
        return Ok(Vec::new());
    };
    let target = NodeRef::from(task_type);
    if input.node.has_link(&key, &target) {
        return Ok(Vec::new());
    }
    Ok(vec![Mutation::link_add(&input.node.iri, key.clone(), &target)])
}
