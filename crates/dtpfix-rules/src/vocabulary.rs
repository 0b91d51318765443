//! Ontology term IRIs.
//!
//! The engine treats term IRIs as opaque strings produced here. Defaults follow
//! each ontology's publishing convention; deployments can override single terms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dtpfix_core::ParseEnumError;

pub const B2T_BASE_URL: &str = "https://www.bim2twin.eu/ontology";
pub const DTC_BASE_URL: &str = "https://dtc-ontology.cms.ed.tum.de/ontology";

/// Literal field written by the IFC importer in place of an element-type link.
pub const IFC_CLASS_FIELD: &str = "ifc:Class";

pub mod terms {
    pub const IS_AS_DESIGNED: &str = "isAsDesigned";
    pub const HAS_ELEMENT_TYPE: &str = "hasElementType";
    pub const HAS_TASK_TYPE: &str = "hasTaskType";
    pub const PROGRESS: &str = "progress";
    pub const HAS_GEOMETRIC_DEFECT: &str = "hasGeometricDefect";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ontology {
    B2t,
    Dtc,
}

impl Ontology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ontology::B2t => "b2t",
            Ontology::Dtc => "dtc",
        }
    }
}

impl fmt::Display for Ontology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ontology {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b2t" | "bim2twin" => Ok(Ontology::B2t),
            "dtc" => Ok(Ontology::Dtc),
            _ => Err(ParseEnumError {
                kind: "ontology",
                value: s.to_string(),
                expected: "b2t, dtc".to_string(),
            }),
        }
    }
}

/// B2T splits its terms over modules (`<base>/<Module>#<term>`).
fn b2t_module(term: &str) -> &'static str {
    match term {
        terms::HAS_TASK_TYPE | terms::PROGRESS => "Construction",
        terms::HAS_GEOMETRIC_DEFECT => "Defect",
        _ => "Core",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    ontology: Ontology,
    overrides: BTreeMap<String, String>,
}

impl Vocabulary {
    pub fn new(ontology: Ontology) -> Self {
        Self {
            ontology,
            overrides: BTreeMap::new(),
        }
    }

    pub fn b2t() -> Self {
        Self::new(Ontology::B2t)
    }

    pub fn dtc() -> Self {
        Self::new(Ontology::Dtc)
    }

    pub fn with_override(mut self, term: impl Into<String>, iri: impl Into<String>) -> Self {
        self.overrides.insert(term.into(), iri.into());
        self
    }

    pub fn ontology(&self) -> Ontology {
        self.ontology
    }

    pub fn base(&self) -> &'static str {
        match self.ontology {
            Ontology::B2t => B2T_BASE_URL,
            Ontology::Dtc => DTC_BASE_URL,
        }
    }

    /// Full IRI of `term`.
    pub fn iri(&self, term: &str) -> String {
        if let Some(iri) = self.overrides.get(term) {
            return iri.clone();
        }
        match self.ontology {
            Ontology::B2t => format!("{}/{}#{}", B2T_BASE_URL, b2t_module(term), term),
            Ontology::Dtc => format!("{DTC_BASE_URL}#{term}"),
        }
    }

    /// True when `value` already points into this ontology.
    pub fn is_ontology_iri(&self, value: &str) -> bool {
        value.starts_with(self.base())
    }
}
