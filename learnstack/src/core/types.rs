//! Shared deterministic types for the learning stack.
//!
//! These types define the wire contract with the reasoning service and the
//! records held by the session stores. They must not depend on I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Waiting,
    Done,
}

/// One frame of the learning stack.
///
/// The stack is a flat ordered sequence; nesting is expressed only through
/// `level` (root is 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackNode {
    pub id: String,
    pub topic: String,
    pub level: u32,
    pub status: NodeStatus,
}

/// Model-declared intent for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnAction {
    Push,
    Stay,
    TriggerGate,
}

/// Structured block returned by the model under the JSON protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnDirective {
    pub action: TurnAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_stack: Option<Vec<StackNode>>,
}

/// Model judgement on a user's synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub approved: bool,
    pub feedback: String,
}

/// Author of a transcript entry. `Error` tags transport and service failures
/// so they render apart from ordinary assistant output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// State format negotiated with the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Free-form markdown document inside a ```` ```markdown ```` fence.
    #[default]
    Markdown,
    /// Node array plus action tag inside a ```` ```json ```` fence.
    Json,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Markdown => "markdown",
            Protocol::Json => "json",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Protocol::Markdown),
            "json" => Ok(Protocol::Json),
            other => Err(format!(
                "unknown protocol '{other}' (expected markdown or json)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_action_uses_screaming_case_on_the_wire() {
        let action: TurnAction = serde_json::from_str("\"TRIGGER_GATE\"").expect("parse");
        assert_eq!(action, TurnAction::TriggerGate);
        assert_eq!(
            serde_json::to_string(&TurnAction::Push).expect("serialize"),
            "\"PUSH\""
        );
    }

    #[test]
    fn node_status_uses_capitalised_names() {
        let node: StackNode = serde_json::from_str(
            r#"{"id":"root","topic":"Recursion","level":0,"status":"Waiting"}"#,
        )
        .expect("parse");
        assert_eq!(node.status, NodeStatus::Waiting);
    }

    #[test]
    fn protocol_parses_aliases() {
        assert_eq!("MD".parse::<Protocol>(), Ok(Protocol::Markdown));
        assert_eq!(" json ".parse::<Protocol>(), Ok(Protocol::Json));
        assert!("yaml".parse::<Protocol>().is_err());
    }
}
