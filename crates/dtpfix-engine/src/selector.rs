//! Candidate node selection.
//!
//! `all` levels/types expand to every concrete `(level, type)` pair, queried in
//! enumeration order, page by page. Results are unioned and deduplicated by IRI;
//! a node classified under several types is reported once, under the first
//! pair that returned it.

use std::collections::{HashSet, VecDeque};

use dtpfix_core::{GraphClient, NodeRecord, NodeRef, NodeType, OntologyLevel, Target};

use crate::error::SelectionError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedNode {
    pub level: OntologyLevel,
    pub node_type: NodeType,
    pub record: NodeRecord,
}

/// Lazy iterator over the selected nodes. Holds at most one page in memory
/// (plus the IRIs already yielded). Stops after the first error.
pub struct Selector<'g, G: GraphClient + ?Sized> {
    client: &'g G,
    page_size: usize,
    pairs: Vec<(OntologyLevel, NodeType)>,
    pair: usize,
    cursor: Option<String>,
    pair_done: bool,
    buffer: VecDeque<NodeRecord>,
    seen: HashSet<NodeRef>,
    failed: bool,
}

pub fn select<'g, G: GraphClient + ?Sized>(
    client: &'g G,
    level: Target<OntologyLevel>,
    node_type: Target<NodeType>,
    page_size: usize,
) -> Selector<'g, G> {
    let pairs = level
        .expand()
        .into_iter()
        .flat_map(|l| node_type.expand().into_iter().map(move |t| (l, t)))
        .collect();
    Selector {
        client,
        page_size: page_size.max(1),
        pairs,
        pair: 0,
        cursor: None,
        pair_done: false,
        buffer: VecDeque::new(),
        seen: HashSet::new(),
        failed: false,
    }
}

impl<G: GraphClient + ?Sized> Selector<'_, G> {
    pub fn pairs(&self) -> &[(OntologyLevel, NodeType)] {
        &self.pairs
    }
}

impl<G: GraphClient + ?Sized> Iterator for Selector<'_, G> {
    type Item = Result<SelectedNode, SelectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(record) = self.buffer.pop_front() {
                if !self.seen.insert(record.iri.clone()) {
                    continue;
                }
                let (level, node_type) = self.pairs[self.pair];
                return Some(Ok(SelectedNode {
                    level,
                    node_type,
                    record,
                }));
            }
            if self.pair_done {
                self.pair += 1;
                self.cursor = None;
                self.pair_done = false;
            }
            let (level, node_type) = *self.pairs.get(self.pair)?;

            match self.client.fetch_by_level_and_type(
                level,
                node_type,
                self.cursor.as_deref(),
                self.page_size,
            ) {
                Ok(page) => {
                    tracing::debug!(
                        %level,
                        %node_type,
                        nodes = page.nodes.len(),
                        "fetched page"
                    );
                    self.buffer.extend(page.nodes);
                    match page.next_cursor {
                        Some(next) => self.cursor = Some(next),
                        None => self.pair_done = true,
                    }
                }
                Err(source) => {
                    self.failed = true;
                    return Some(Err(SelectionError::Query {
                        level,
                        node_type,
                        source,
                    }));
                }
            }
        }
    }
}
