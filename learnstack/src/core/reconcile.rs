//! Response reconciliation: turn raw model output into a state proposal and
//! a transcript entry.
//!
//! Reconciliation never fails. Absence of a block, a malformed block and an
//! invalid proposed stack all degrade to "state unchanged, show the text".

use tracing::{debug, warn};

use crate::core::directive::parse_directive;
use crate::core::fence::{FenceTag, extract_fenced_block};
use crate::core::invariants::{validate_stack, validate_transition};
use crate::core::types::{StackNode, TurnAction};

/// Assistant text used when a response carries nothing but the state block.
pub const EMPTY_COMMENTARY: &str = "(state updated)";

/// Advisory note appended when the model asks for a gate.
pub const GATE_HINT: &str = "The tutor thinks this topic is complete. Select the parent node in the stack to open the knowledge gate.";

/// Outcome of reconciling a markdown-protocol response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownReconciliation {
    /// Replacement document, when a block was found.
    pub document: Option<String>,
    /// Text to show as the assistant turn.
    pub commentary: String,
}

/// Outcome of reconciling a JSON-protocol response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackReconciliation {
    /// Parsed action, when the block parsed.
    pub action: Option<TurnAction>,
    /// Replacement stack, when present and structurally valid.
    pub stack: Option<Vec<StackNode>>,
    /// Text to show as the assistant turn.
    pub commentary: String,
    /// System notes to append after the assistant turn.
    pub notes: Vec<String>,
    /// Why the block was ignored, for diagnostics.
    pub failure: Option<String>,
}

pub fn reconcile_markdown(raw: &str) -> MarkdownReconciliation {
    let Some(block) = extract_fenced_block(raw, FenceTag::Markdown) else {
        debug!("no markdown block in response; state unchanged");
        return MarkdownReconciliation {
            document: None,
            commentary: raw.trim().to_string(),
        };
    };

    MarkdownReconciliation {
        document: Some(block.inner().to_string()),
        commentary: commentary_or_placeholder(block.surrounding_text()),
    }
}

/// Reconcile a JSON-protocol response against the `current` stack.
///
/// A proposed stack is adopted only when it is structurally valid and keeps
/// the current active node. Under `TRIGGER_GATE` the proposal is ignored
/// entirely: the pop happens through the gate or not at all.
pub fn reconcile_json(raw: &str, current: &[StackNode]) -> StackReconciliation {
    let Some(block) = extract_fenced_block(raw, FenceTag::Json) else {
        debug!("no json block in response; state unchanged");
        return StackReconciliation::unchanged(raw, None);
    };

    let directive = match parse_directive(block.inner()) {
        Ok(directive) => directive,
        Err(err) => {
            warn!(error = %err, "ignoring malformed json block");
            return StackReconciliation::unchanged(raw, Some(err));
        }
    };
    debug!(action = ?directive.action, has_stack = directive.updated_stack.is_some(), "parsed turn directive");

    let mut notes = Vec::new();
    let mut failure = None;
    let stack = match directive.updated_stack {
        Some(_) if directive.action == TurnAction::TriggerGate => {
            debug!("ignoring updated_stack sent with TRIGGER_GATE");
            None
        }
        Some(proposed) => {
            let mut errors = validate_stack(&proposed);
            errors.extend(validate_transition(current, &proposed));
            if errors.is_empty() {
                Some(proposed)
            } else {
                let reason = errors.join("; ");
                warn!(error = %reason, "rejecting proposed stack");
                notes.push(format!(
                    "The tutor proposed an invalid stack, so it was ignored ({reason})."
                ));
                failure = Some(reason);
                None
            }
        }
        None => None,
    };

    if directive.action == TurnAction::TriggerGate {
        notes.push(GATE_HINT.to_string());
    }

    StackReconciliation {
        action: Some(directive.action),
        stack,
        commentary: commentary_or_placeholder(block.surrounding_text()),
        notes,
        failure,
    }
}

impl StackReconciliation {
    fn unchanged(raw: &str, failure: Option<String>) -> Self {
        Self {
            action: None,
            stack: None,
            commentary: raw.trim().to_string(),
            notes: Vec::new(),
            failure,
        }
    }
}

fn commentary_or_placeholder(text: String) -> String {
    if text.is_empty() {
        EMPTY_COMMENTARY.to_string()
    } else {
        text
    }
}
