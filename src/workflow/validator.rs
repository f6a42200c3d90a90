//! SOP document validation.
//!
//! All structural problems are rejected here, at load time, so traversal
//! never has to cope with dangling references or under-specified nodes.

use std::collections::HashSet;

use super::types::{NodeKind, WorkflowDocument};
use crate::error::{Error, Result};

/// Validate a document definition.
///
/// Checks for:
/// - Required fields (name, nodes)
/// - Unique, non-empty node ids
/// - Edge endpoints that reference existing nodes
/// - Child references that exist and differ from the parent
/// - Per-kind configuration (decision condition, loop iterator, filter
///   and generator configs, assert conditions)
/// - Sane retry policies (at least one attempt, non-empty schedule)
pub fn validate_document(document: &WorkflowDocument) -> Result<()> {
    if document.name.is_empty() {
        return Err(Error::Validation("Document name is required".into()));
    }

    if document.nodes.is_empty() {
        return Err(Error::Validation(
            "Document must have at least one node".into(),
        ));
    }

    let mut ids = HashSet::new();
    for node in &document.nodes {
        if node.id.is_empty() {
            return Err(Error::Validation("Node id cannot be empty".into()));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(Error::Validation(format!("Duplicate node id: {}", node.id)));
        }
    }

    for edge in &document.edges {
        if !ids.contains(edge.source.as_str()) {
            return Err(Error::Validation(format!(
                "Edge references non-existent source node '{}'",
                edge.source
            )));
        }
        if !ids.contains(edge.target.as_str()) {
            return Err(Error::Validation(format!(
                "Edge references non-existent target node '{}'",
                edge.target
            )));
        }
    }

    for node in &document.nodes {
        for child in &node.children {
            if !ids.contains(child.as_str()) {
                return Err(Error::Validation(format!(
                    "Node '{}' references non-existent child '{}'",
                    node.id, child
                )));
            }
            if child == &node.id {
                return Err(Error::Validation(format!(
                    "Node '{}' lists itself as a child",
                    node.id
                )));
            }
        }

        validate_node_kind(document, node)?;

        if let Some(retry) = &node.retry {
            if retry.max_attempts == 0 {
                return Err(Error::Validation(format!(
                    "Node '{}' retry policy must allow at least one attempt",
                    node.id
                )));
            }
            if retry.backoff_schedule_ms.is_empty() {
                return Err(Error::Validation(format!(
                    "Node '{}' retry policy has an empty backoff schedule",
                    node.id
                )));
            }
        }
    }

    Ok(())
}

fn validate_node_kind(document: &WorkflowDocument, node: &super::types::Node) -> Result<()> {
    match node.kind {
        NodeKind::Task => {
            if node.actions.is_empty() {
                return Err(Error::Validation(format!(
                    "Task node '{}' declares no actions",
                    node.id
                )));
            }
        }
        NodeKind::Compound => {
            if node.auto_expand && node.children.is_empty() {
                return Err(Error::Validation(format!(
                    "Compound node '{}' auto-expands but has no children",
                    node.id
                )));
            }
        }
        NodeKind::Decision => {
            // Unresolved conditions are a validation error, never a
            // coin flip at traversal time.
            if node.condition.as_deref().unwrap_or("").trim().is_empty() {
                return Err(Error::Validation(format!(
                    "Decision node '{}' has no condition expression",
                    node.id
                )));
            }
            let mut has_yes = false;
            let mut has_no = false;
            for edge in document.edges.iter().filter(|e| e.source == node.id) {
                match edge.condition {
                    Some(super::types::EdgeCondition::Yes) => has_yes = true,
                    Some(super::types::EdgeCondition::No) => has_no = true,
                    _ => {}
                }
            }
            if !has_yes || !has_no {
                return Err(Error::Validation(format!(
                    "Decision node '{}' must have both yes and no edges",
                    node.id
                )));
            }
        }
        NodeKind::Loop => {
            if node.iterator.is_none() {
                return Err(Error::Validation(format!(
                    "Loop node '{}' has no iterator configuration",
                    node.id
                )));
            }
            if node.children.is_empty() {
                return Err(Error::Validation(format!(
                    "Loop node '{}' has an empty iteration body",
                    node.id
                )));
            }
        }
        NodeKind::Assert => {
            if node.assert_conditions.is_empty() {
                return Err(Error::Validation(format!(
                    "Assert node '{}' declares no conditions",
                    node.id
                )));
            }
        }
        NodeKind::Filter => {
            let Some(filter) = &node.filter else {
                return Err(Error::Validation(format!(
                    "Filter node '{}' has no filter configuration",
                    node.id
                )));
            };
            if filter.batch_size == 0 {
                return Err(Error::Validation(format!(
                    "Filter node '{}' has batch_size 0",
                    node.id
                )));
            }
        }
        NodeKind::Generator => {
            if node.generator.is_none() {
                return Err(Error::Validation(format!(
                    "Generator node '{}' has no generator configuration",
                    node.id
                )));
            }
        }
    }
    Ok(())
}
