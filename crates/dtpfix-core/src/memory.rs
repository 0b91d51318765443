//! In-process graph store implementing [`GraphClient`].
//!
//! Used by the test suites. Failure injection hooks let tests drive the
//! error paths.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::{GraphClient, GraphError, LinkOp, NodePage};
use crate::node::{FieldValue, Link, NodeRecord, NodeRef, NodeType, OntologyLevel};

#[derive(Debug, Clone)]
struct StoredNode {
    level: OntologyLevel,
    node_types: BTreeSet<NodeType>,
    record: NodeRecord,
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: RwLock<BTreeMap<NodeRef, StoredNode>>,
    failing_writes: RwLock<HashSet<NodeRef>>,
    failing_queries: RwLock<HashSet<(OntologyLevel, NodeType)>>,
    writes: AtomicUsize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` at `level`, classified under every type in `node_types`.
    pub fn insert(&self, level: OntologyLevel, node_types: &[NodeType], record: NodeRecord) {
        let record = record.normalized();
        self.nodes.write().insert(
            record.iri.clone(),
            StoredNode {
                level,
                node_types: node_types.iter().copied().collect(),
                record,
            },
        );
    }

    pub fn get(&self, iri: &NodeRef) -> Option<NodeRecord> {
        self.nodes.read().get(iri).map(|n| n.record.clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Full copy of the store, keyed by IRI.
    pub fn snapshot(&self) -> BTreeMap<NodeRef, NodeRecord> {
        self.nodes
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.record.clone()))
            .collect()
    }

    /// Number of write calls that reached the store (successful or not).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write addressed to `iri` fail with a transport error.
    pub fn fail_writes_to(&self, iri: &NodeRef) {
        self.failing_writes.write().insert(iri.clone());
    }

    /// Makes every subsequent query for `(level, node_type)` fail.
    pub fn fail_queries_for(&self, level: OntologyLevel, node_type: NodeType) {
        self.failing_queries.write().insert((level, node_type));
    }

    pub fn clear_failures(&self) {
        self.failing_writes.write().clear();
        self.failing_queries.write().clear();
    }

    fn write<F>(&self, iri: &NodeRef, f: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut NodeRecord) -> Result<(), GraphError>,
    {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_writes.read().contains(iri) {
            return Err(GraphError::Transport(format!(
                "injected write failure for {iri}"
            )));
        }
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(iri)
            .ok_or_else(|| GraphError::NotFound(iri.clone()))?;
        f(&mut node.record)
    }
}

fn rejected(iri: &NodeRef, message: impl Into<String>) -> GraphError {
    GraphError::Rejected {
        iri: iri.clone(),
        message: message.into(),
    }
}

impl GraphClient for MemoryGraph {
    fn fetch(&self, iri: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        Ok(self.get(iri))
    }

    fn fetch_by_level_and_type(
        &self,
        level: OntologyLevel,
        node_type: NodeType,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<NodePage, GraphError> {
        if self.failing_queries.read().contains(&(level, node_type)) {
            return Err(GraphError::Transport(format!(
                "injected query failure for {level}/{node_type}"
            )));
        }
        let page_size = page_size.max(1);
        let nodes = self.nodes.read();
        let mut page: Vec<NodeRecord> = nodes
            .iter()
            .filter(|(iri, _)| cursor.map_or(true, |c| iri.as_str() > c))
            .filter(|(_, n)| n.level == level && n.node_types.contains(&node_type))
            .take(page_size + 1)
            .map(|(_, n)| n.record.clone())
            .collect();
        let next_cursor = if page.len() > page_size {
            page.truncate(page_size);
            page.last().map(|n| n.iri.to_string())
        } else {
            None
        };
        Ok(NodePage {
            nodes: page,
            next_cursor,
        })
    }

    fn add_field(&self, iri: &NodeRef, key: &str, value: &FieldValue) -> Result<(), GraphError> {
        self.write(iri, |record| {
            if record.has_field(key) {
                return Err(rejected(iri, format!("field `{key}` already present")));
            }
            record.fields.insert(key.to_string(), value.clone());
            Ok(())
        })
    }

    fn remove_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
    ) -> Result<(), GraphError> {
        self.write(iri, |record| {
            let current = record
                .field(key)
                .ok_or_else(|| rejected(iri, format!("field `{key}` not present")))?;
            if let Some(previous) = previous {
                if previous != current {
                    return Err(rejected(iri, format!("field `{key}` holds a different value")));
                }
            }
            record.fields.remove(key);
            Ok(())
        })
    }

    fn replace_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
        value: &FieldValue,
    ) -> Result<(), GraphError> {
        self.write(iri, |record| {
            let current = record
                .field(key)
                .ok_or_else(|| rejected(iri, format!("field `{key}` not present")))?;
            if let Some(previous) = previous {
                if previous != current {
                    return Err(rejected(iri, format!("field `{key}` holds a different value")));
                }
            }
            record.fields.insert(key.to_string(), value.clone());
            Ok(())
        })
    }

    fn apply_link(
        &self,
        iri: &NodeRef,
        predicate: &str,
        target: &NodeRef,
        op: LinkOp,
    ) -> Result<(), GraphError> {
        self.write(iri, |record| match op {
            LinkOp::Add => {
                if record.has_link(predicate, target) {
                    return Err(rejected(iri, format!("link `{predicate}` already present")));
                }
                record.links.push(Link::new(predicate, target.clone()));
                Ok(())
            }
            LinkOp::Remove => {
                if !record.has_link(predicate, target) {
                    return Err(rejected(iri, format!("link `{predicate}` not present")));
                }
                record
                    .links
                    .retain(|l| !(l.predicate == predicate && &l.target == target));
                Ok(())
            }
        })
    }

    fn replace_iri(&self, old: &NodeRef, new: &NodeRef) -> Result<(), GraphError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_writes.read().contains(old) {
            return Err(GraphError::Transport(format!(
                "injected write failure for {old}"
            )));
        }
        let mut nodes = self.nodes.write();
        if nodes.contains_key(new) {
            return Err(rejected(old, format!("a node already exists at {new}")));
        }
        let mut node = nodes
            .remove(old)
            .ok_or_else(|| GraphError::NotFound(old.clone()))?;
        node.record.iri = new.clone();
        nodes.insert(new.clone(), node);

        // Inbound links follow the node to its new address.
        for other in nodes.values_mut() {
            for link in other.record.links.iter_mut() {
                if &link.target == old {
                    link.target = new.clone();
                }
            }
        }
        Ok(())
    }
}
