//! Plain-text rendering of session state for the terminal.

use crate::core::document::{DocumentView, parse_document};
use crate::core::gate::{GatePhase, GateRequest};
use crate::core::stack::eligible_parent;
use crate::core::types::{ConversationTurn, NodeStatus, Role, StackNode};
use crate::session::StackState;

/// Render whichever state the session holds.
pub fn render_state(state: &StackState) -> String {
    match state {
        StackState::Markdown { document } => render_document_view(&parse_document(document)),
        StackState::Json { stack } => render_stack(stack),
    }
}

/// Indented stack listing. Nodes that can be selected to open a gate are
/// marked with `^`.
pub fn render_stack(stack: &[StackNode]) -> String {
    if stack.is_empty() {
        return "(empty stack)".to_string();
    }
    let mut lines = Vec::with_capacity(stack.len());
    for node in stack {
        let selectable = eligible_parent(stack, &node.id).is_some();
        lines.push(format!(
            "{}{} [{}] {} ({}){}",
            "  ".repeat(node.level as usize),
            status_marker(node.status),
            node.id,
            node.topic,
            status_label(node.status),
            if selectable { "  ^ /select to close" } else { "" },
        ));
    }
    lines.join("\n")
}

/// Goal, stack and cache sections reconstructed from a markdown document.
pub fn render_document_view(view: &DocumentView) -> String {
    if view.is_empty() {
        return "(no stack yet)".to_string();
    }
    let mut buf = String::new();
    if let Some(goal) = &view.goal {
        buf.push_str(&format!("Goal: {goal}\n"));
    }
    if let Some(entry) = view.active() {
        buf.push_str(&format!("Now exploring: {}\n", entry.topic));
    }
    if !view.stack.is_empty() {
        buf.push_str("\nStack:\n");
        for entry in &view.stack {
            let marker = if entry.active { '>' } else { ' ' };
            buf.push_str(&format!(
                "{}{} [Level {}] {}\n",
                "  ".repeat(entry.level as usize),
                marker,
                entry.level,
                entry.topic
            ));
        }
    }
    if !view.cache.is_empty() {
        buf.push_str("\nCache:\n");
        for item in &view.cache {
            buf.push_str(&format!("- {item}\n"));
        }
    }
    buf.trim_end().to_string()
}

pub fn render_turn(turn: &ConversationTurn) -> String {
    let label = match turn.role {
        Role::User => "you",
        Role::Assistant => "tutor",
        Role::System => "system",
        Role::Error => "error",
    };
    format!("[{label}] {}", turn.text)
}

pub fn render_gate(gate: &GateRequest) -> String {
    let mut buf = format!(
        "Knowledge gate: explain how \"{}\" helps with \"{}\".",
        gate.child.topic, gate.parent.topic
    );
    match gate.phase {
        GatePhase::Collecting => buf.push_str("\nSubmit with /verify <your synthesis>, or /dismiss."),
        GatePhase::Verifying => buf.push_str("\nVerifying..."),
        GatePhase::Approved => {}
    }
    if let Some(verdict) = &gate.verdict {
        let outcome = if verdict.approved { "approved" } else { "not yet" };
        buf.push_str(&format!("\nVerdict: {outcome}. {}", verdict.feedback));
    }
    buf
}

fn status_marker(status: NodeStatus) -> char {
    match status {
        NodeStatus::Active => '>',
        NodeStatus::Waiting => '-',
        NodeStatus::Done => 'x',
    }
}

fn status_label(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Active => "active",
        NodeStatus::Waiting => "waiting",
        NodeStatus::Done => "done",
    }
}
