//! Knowledge gate: the only code-enforced pop in the system.
//!
//! A gate captures the `(child, parent)` pair at open time. The pop is applied
//! later, after the model approves the user's synthesis, and only if that
//! snapshot still describes the current stack.

use serde::Serialize;

use crate::core::stack::{active_node, eligible_parent, find_node, pop_to_parent};
use crate::core::types::{GateVerdict, StackNode};

/// Where an open gate is in its verification cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// Waiting for the user to submit (or resubmit) a synthesis.
    Collecting,
    /// A verification request is in flight.
    Verifying,
    /// The model approved; the pop is pending. No further submissions.
    Approved,
}

/// Transient state of an open gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateRequest {
    pub child: StackNode,
    pub parent: StackNode,
    pub synthesis: String,
    pub verdict: Option<GateVerdict>,
    pub phase: GatePhase,
}

/// Open a gate when `selected_id` is an eligible parent of the active node.
pub fn open_gate(stack: &[StackNode], selected_id: &str) -> Option<GateRequest> {
    let (child, parent) = eligible_parent(stack, selected_id)?;
    Some(GateRequest {
        child: child.clone(),
        parent: parent.clone(),
        synthesis: String::new(),
        verdict: None,
        phase: GatePhase::Collecting,
    })
}

/// Confirm the snapshot captured by `gate` still holds for `stack`.
pub fn check_snapshot(stack: &[StackNode], gate: &GateRequest) -> Result<(), String> {
    let active = active_node(stack)
        .ok_or_else(|| "stack has no active node anymore".to_string())?;
    if active.id != gate.child.id || active.level != gate.child.level {
        return Err(format!(
            "active node changed from '{}' to '{}' since the gate opened",
            gate.child.id, active.id
        ));
    }
    let parent = find_node(stack, &gate.parent.id)
        .ok_or_else(|| format!("parent node '{}' no longer exists", gate.parent.id))?;
    if parent.level != gate.parent.level {
        return Err(format!(
            "parent node '{}' moved from level {} to level {}",
            parent.id, gate.parent.level, parent.level
        ));
    }
    Ok(())
}

/// Apply the approved pop: validate the snapshot, then build the next stack.
pub fn apply_gate(stack: &[StackNode], gate: &GateRequest) -> Result<Vec<StackNode>, String> {
    check_snapshot(stack, gate)?;
    pop_to_parent(stack, &gate.child.id, &gate.parent.id)
}
