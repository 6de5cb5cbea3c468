//! Structural invariants a proposed stack must satisfy before it may replace
//! the current one. These are checks the JSON Schema cannot express.

use std::collections::HashSet;

use crate::core::stack::active_node;
use crate::core::types::{NodeStatus, StackNode};

/// Check structural invariants of a stack:
/// - ids are non-empty and unique
/// - topics are non-empty
/// - at most one node is `Active`
///
/// Levels are deliberately not checked against array position.
pub fn validate_stack(stack: &[StackNode]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, node) in stack.iter().enumerate() {
        if node.id.trim().is_empty() {
            errors.push(format!("node {index}: id must be non-empty"));
        } else if !seen.insert(node.id.as_str()) {
            errors.push(format!("node {index}: duplicate id '{}'", node.id));
        }
        if node.topic.trim().is_empty() {
            errors.push(format!("node {index}: topic must be non-empty"));
        }
    }

    let active: Vec<&str> = stack
        .iter()
        .filter(|node| node.status == NodeStatus::Active)
        .map(|node| node.id.as_str())
        .collect();
    if active.len() > 1 {
        errors.push(format!(
            "expected at most one Active node, found {} ({})",
            active.len(),
            active.join(", ")
        ));
    }

    errors
}

/// Check that replacing `current` with `proposed` does not pop the current
/// active node. The node may stay active or become `Waiting` under a deeper
/// topic, but removing it or marking it `Done` is reserved for the gate.
pub fn validate_transition(current: &[StackNode], proposed: &[StackNode]) -> Vec<String> {
    let Some(current_active) = active_node(current) else {
        return Vec::new();
    };
    match proposed.iter().find(|node| node.id == current_active.id) {
        None => vec![format!(
            "active node '{}' was removed; topics are closed through the knowledge gate",
            current_active.id
        )],
        Some(node) if node.status == NodeStatus::Done => vec![format!(
            "active node '{}' was marked Done; topics are closed through the knowledge gate",
            current_active.id
        )],
        Some(_) => Vec::new(),
    }
}
