//! Digital Twin Construction rules.
//!
//! DTC graphs were bootstrapped from B2T exports, so most fixes migrate B2T
//! leftovers onto DTC terms.

use dtpfix_core::Mutation;

use crate::vocabulary::{terms, Vocabulary};
use crate::{RuleEvaluationError, RuleInput};

pub(crate) fn migrate_as_designed(
    input: &RuleInput<'_>,
) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let legacy_key = Vocabulary::b2t().iri(terms::IS_AS_DESIGNED);
    let key = input.vocabulary.iri(terms::IS_AS_DESIGNED);
    if legacy_key == key {
        return Ok(Vec::new());
    }
    let Some(value) = input.node.field(&legacy_key) else {
        return Ok(Vec::new());
    };

    let iri = &input.node.iri;
    let mut out = vec![Mutation::field_remove(iri, legacy_key.clone(), value.clone())];
    match input.node.field(&key) {
        None => out.push(Mutation::field_add(iri, key, value.clone())),
        Some(current) if current != value => {
            out.push(Mutation::field_replace(iri, key, current.clone(), value.clone()))
        }
        Some(_) => {}
    }
    Ok(out)
}

pub(crate) fn remove_progress(input: &RuleInput<'_>) -> Result<Vec<Mutation>, RuleEvaluationError> {
    let key = input.vocabulary.iri(terms::PROGRESS);
    Ok(input
        .node
        .field(&key)
        .map(|value| vec![Mutation::field_remove(&input.node.iri, key.clone(), value.clone())])
        .unwrap_or_default())
}
