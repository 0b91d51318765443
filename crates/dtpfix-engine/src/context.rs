//! Immutable run context.

use std::path::{Path, PathBuf};

use dtpfix_rules::{ElementTypeMap, Ontology, Vocabulary};

use crate::journal::SESSIONS_DIR;

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Everything a run needs besides the graph client. Built once, then shared
/// by reference with the selector, executor and journal.
#[derive(Debug, Clone)]
pub struct FixContext {
    ontology: Ontology,
    log_dir: PathBuf,
    vocabulary: Vocabulary,
    element_type_map: ElementTypeMap,
    page_size: usize,
}

impl FixContext {
    pub fn new(ontology: Ontology, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            ontology,
            log_dir: log_dir.into(),
            vocabulary: Vocabulary::new(ontology),
            element_type_map: ElementTypeMap::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Replaces the vocabulary. It must describe the same ontology.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        debug_assert_eq!(vocabulary.ontology(), self.ontology);
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_element_type_map(mut self, map: ElementTypeMap) -> Self {
        self.element_type_map = map;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn ontology(&self) -> Ontology {
        self.ontology
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.log_dir.join(SESSIONS_DIR)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn element_type_map(&self) -> &ElementTypeMap {
        &self.element_type_map
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
