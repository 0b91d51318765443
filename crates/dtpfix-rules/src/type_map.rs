//! IFC class → ontology element-type mapping (`element_type_map.yaml`).
//!
//! ```yaml
//! IfcWall: https://www.bim2twin.eu/ontology/Core#Wall
//! IfcOpeningElement: ignore
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const IGNORE: &str = "ignore";

#[derive(Debug, thiserror::Error)]
pub enum TypeMapError {
    #[error("failed to read element type map `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid element type map: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMapping<'a> {
    Target(&'a str),
    /// Class is known but deliberately left untyped.
    Ignore,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementTypeMap(BTreeMap<String, String>);

impl ElementTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, TypeMapError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, TypeMapError> {
        let text = std::fs::read_to_string(path).map_err(|source| TypeMapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn with(mut self, class: impl Into<String>, target: impl Into<String>) -> Self {
        self.0.insert(class.into(), target.into());
        self
    }

    pub fn lookup(&self, class: &str) -> TypeMapping<'_> {
        match self.0.get(class).map(|s| s.trim()) {
            Some(t) if t.eq_ignore_ascii_case(IGNORE) => TypeMapping::Ignore,
            Some(t) => TypeMapping::Target(t),
            None => TypeMapping::Unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
