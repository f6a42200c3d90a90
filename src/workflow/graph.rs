//! Resolved document graph.
//!
//! The raw document references nodes by string id. Resolving it once at
//! load time turns edges into index lists and rejects dangling references
//! before traversal begins, so the interpreter never chases a missing id.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Edge, EdgeCondition, Node, WorkflowDocument};
use crate::error::{Error, Result};

/// A validated document with its adjacency resolved.
#[derive(Debug, Clone)]
pub struct DocumentGraph {
    document: Arc<WorkflowDocument>,
    index: HashMap<String, usize>,
    /// Per-node outgoing edge indices, in document order.
    outgoing: Vec<Vec<usize>>,
    entry: usize,
}

impl DocumentGraph {
    /// Resolve a document into an adjacency structure.
    ///
    /// Fails on dangling edge or child references. Callers should run
    /// [`super::validate_document`] first for the full structural checks.
    pub fn resolve(document: Arc<WorkflowDocument>) -> Result<Self> {
        let mut index = HashMap::with_capacity(document.nodes.len());
        for (i, node) in document.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(Error::Validation(format!("Duplicate node id: {}", node.id)));
            }
        }

        let mut outgoing = vec![Vec::new(); document.nodes.len()];
        for (edge_idx, edge) in document.edges.iter().enumerate() {
            let source = *index.get(&edge.source).ok_or_else(|| {
                Error::Validation(format!("Dangling edge source '{}'", edge.source))
            })?;
            if !index.contains_key(&edge.target) {
                return Err(Error::Validation(format!(
                    "Dangling edge target '{}'",
                    edge.target
                )));
            }
            outgoing[source].push(edge_idx);
        }

        // Entry: target of the start-tagged edge if present, else the
        // first node in document order.
        let entry = document
            .edges
            .iter()
            .find(|e| e.condition == Some(EdgeCondition::Start))
            .map(|e| index[&e.target])
            .unwrap_or(0);

        Ok(Self {
            document,
            index,
            outgoing,
            entry,
        })
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    /// Entry node for a fresh run.
    pub fn entry_node(&self) -> &Node {
        &self.document.nodes[self.entry]
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.index
            .get(id)
            .map(|&i| &self.document.nodes[i])
            .ok_or_else(|| Error::Execution(format!("Unknown node id '{}'", id)))
    }

    fn edges_from(&self, id: &str) -> impl Iterator<Item = &Edge> {
        let indices = self
            .index
            .get(id)
            .map(|&i| self.outgoing[i].as_slice())
            .unwrap_or(&[]);
        indices.iter().map(move |&e| &self.document.edges[e])
    }

    /// Default successor: the first outgoing edge in document order that
    /// is not a start tag. Deterministic by construction.
    pub fn next_default(&self, id: &str) -> Option<&str> {
        self.edges_from(id)
            .find(|e| e.condition != Some(EdgeCondition::Start))
            .map(|e| e.target.as_str())
    }

    /// Decision successor for a boolean outcome.
    pub fn branch_target(&self, id: &str, outcome: bool) -> Result<&str> {
        let wanted = if outcome {
            EdgeCondition::Yes
        } else {
            EdgeCondition::No
        };
        self.edges_from(id)
            .find(|e| e.condition == Some(wanted))
            .map(|e| e.target.as_str())
            .ok_or_else(|| {
                Error::Execution(format!(
                    "Decision node '{}' has no edge for outcome '{}'",
                    id,
                    if outcome { "yes" } else { "no" }
                ))
            })
    }

    /// Loop exit successor: the all_processed edge if present, else the
    /// default successor.
    pub fn loop_exit(&self, id: &str) -> Option<&str> {
        self.edges_from(id)
            .find(|e| e.condition == Some(EdgeCondition::AllProcessed))
            .map(|e| e.target.as_str())
            .or_else(|| self.next_default(id))
    }
}
