//! Prompt composition for chat turns and gate verification.
//!
//! Composition is pure: the same inputs always yield the same prompt. The only
//! shaping applied is truncation of source material to a character budget.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Protocol, StackNode};

const MARKDOWN_TURN_TEMPLATE: &str = include_str!("prompts/markdown_turn.md");
const JSON_TURN_TEMPLATE: &str = include_str!("prompts/json_turn.md");
const GATE_VERIFY_TEMPLATE: &str = include_str!("prompts/gate_verify.md");

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Serialized state handed to the turn template.
#[derive(Debug, Clone, Copy)]
pub enum StateView<'a> {
    Document(&'a str),
    Stack(&'a [StackNode]),
}

impl StateView<'_> {
    fn protocol(&self) -> Protocol {
        match self {
            StateView::Document(_) => Protocol::Markdown,
            StateView::Stack(_) => Protocol::Json,
        }
    }
}

/// Inputs for one chat-turn prompt.
#[derive(Debug, Clone)]
pub struct TurnInputs<'a> {
    pub goal: &'a str,
    pub state: StateView<'a>,
    pub source_context: Option<&'a str>,
    pub message: &'a str,
}

/// Inputs for a gate verification prompt.
#[derive(Debug, Clone, Serialize)]
pub struct GateInputs<'a> {
    pub child: &'a str,
    pub parent: &'a str,
    pub synthesis: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("markdown_turn", MARKDOWN_TURN_TEMPLATE)
            .expect("markdown turn template should be valid");
        env.add_template("json_turn", JSON_TURN_TEMPLATE)
            .expect("json turn template should be valid");
        env.add_template("gate_verify", GATE_VERIFY_TEMPLATE)
            .expect("gate template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

/// Builds prompts within a character budget for source material.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    source_limit_chars: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(12_000)
    }
}

impl PromptComposer {
    pub fn new(source_limit_chars: usize) -> Self {
        Self { source_limit_chars }
    }

    /// Compose the prompt for one chat turn.
    pub fn compose_turn(&self, input: &TurnInputs<'_>) -> Result<String> {
        let source = input
            .source_context
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| truncate_chars(s, self.source_limit_chars));
        let goal = input.goal.trim();
        let message = input.message.trim();

        let engine = PromptEngine::new();
        let prompt = match input.state {
            StateView::Document(document) => engine.render(
                "markdown_turn",
                context! {
                    goal => goal,
                    document => (!document.trim().is_empty()).then(|| document.trim()),
                    source => source,
                    message => message,
                },
            )?,
            StateView::Stack(stack) => engine.render(
                "json_turn",
                context! {
                    goal => goal,
                    stack => (!stack.is_empty()).then(|| render_stack_json(stack)),
                    source => source,
                    message => message,
                },
            )?,
        };
        debug!(
            protocol = %input.state.protocol(),
            prompt_chars = prompt.chars().count(),
            "composed turn prompt"
        );
        Ok(prompt)
    }

    /// Compose the narrow verification prompt: two topic labels and the
    /// user's synthesis, nothing else.
    pub fn compose_gate(&self, input: &GateInputs<'_>) -> Result<String> {
        PromptEngine::new().render(
            "gate_verify",
            context! {
                child => input.child.trim(),
                parent => input.parent.trim(),
                synthesis => input.synthesis.trim(),
            },
        )
    }
}

fn render_stack_json(stack: &[StackNode]) -> String {
    serde_json::to_string_pretty(stack).unwrap_or_else(|_| "[]".to_string())
}

/// Keep at most `limit` characters, appending a marker when text is cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((cut, _)) => {
            debug!(
                limit,
                dropped_bytes = text.len() - cut,
                "truncated source context"
            );
            format!("{}{}", &text[..cut], TRUNCATION_MARKER)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{active, waiting};

    fn markdown_inputs<'a>(document: &'a str, source: Option<&'a str>) -> TurnInputs<'a> {
        TurnInputs {
            goal: "Recursion",
            state: StateView::Document(document),
            source_context: source,
            message: "What is a base case?",
        }
    }

    #[test]
    fn empty_document_renders_as_none() {
        let prompt = PromptComposer::default()
            .compose_turn(&markdown_inputs("  ", None))
            .expect("prompt");
        assert!(prompt.contains("## Current stack document\n\n(none)"));
        assert!(prompt.contains("Recursion"));
        assert!(prompt.contains("What is a base case?"));
        assert!(!prompt.contains("## Source material"));
    }

    #[test]
    fn document_is_embedded_verbatim() {
        let doc = "# 🎯 Goal: Recursion\n\n## 🥞 Stack (递归栈)\n1. [Level 0] Recursion (Active)";
        let prompt = PromptComposer::default()
            .compose_turn(&markdown_inputs(doc, None))
            .expect("prompt");
        assert!(prompt.contains(doc));
    }

    #[test]
    fn stack_is_embedded_as_json() {
        let stack = vec![waiting("root", "Recursion", 0), active("n1", "Base Case", 1)];
        let prompt = PromptComposer::default()
            .compose_turn(&TurnInputs {
                goal: "Recursion",
                state: StateView::Stack(&stack),
                source_context: None,
                message: "next",
            })
            .expect("prompt");
        assert!(prompt.contains("\"id\": \"n1\""));
        assert!(prompt.contains("TRIGGER_GATE"));
    }

    #[test]
    fn empty_stack_renders_as_none() {
        let prompt = PromptComposer::default()
            .compose_turn(&TurnInputs {
                goal: "Recursion",
                state: StateView::Stack(&[]),
                source_context: None,
                message: "next",
            })
            .expect("prompt");
        assert!(prompt.contains("## Current stack\n\n(none)"));
    }

    #[test]
    fn source_context_is_truncated_to_budget() {
        let source = "é".repeat(50);
        let prompt = PromptComposer::new(10)
            .compose_turn(&markdown_inputs("", Some(&source)))
            .expect("prompt");
        assert!(prompt.contains(&format!("{}{}", "é".repeat(10), TRUNCATION_MARKER)));
        assert!(!prompt.contains(&"é".repeat(11)));
    }

    #[test]
    fn short_source_context_is_kept_whole() {
        let prompt = PromptComposer::new(100)
            .compose_turn(&markdown_inputs("", Some("chapter one")))
            .expect("prompt");
        assert!(prompt.contains("## Source material\n\nchapter one"));
        assert!(!prompt.contains("[truncated]"));
    }

    #[test]
    fn gate_prompt_contains_only_topics_and_synthesis() {
        let prompt = PromptComposer::default()
            .compose_gate(&GateInputs {
                child: "Base Case",
                parent: "Recursion",
                synthesis: "It stops the recursion.",
            })
            .expect("prompt");
        assert!(prompt.contains("\"Base Case\""));
        assert!(prompt.contains("\"Recursion\""));
        assert!(prompt.contains("It stops the recursion."));
        assert!(prompt.contains("\"approved\""));
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("日本語テキスト", 3), format!("日本語{TRUNCATION_MARKER}"));
    }
}
