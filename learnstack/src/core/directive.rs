//! Schema-checked parsing of the JSON blocks the model returns.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::core::fence::{FenceTag, extract_fenced_block};
use crate::core::types::{GateVerdict, StackNode, TurnAction, TurnDirective};

const TURN_DIRECTIVE_SCHEMA: &str = include_str!("../../schemas/turn_directive.schema.json");
const GATE_VERDICT_SCHEMA: &str = include_str!("../../schemas/gate_verdict.schema.json");

static TURN_DIRECTIVE_VALIDATOR: LazyLock<Validator> =
    LazyLock::new(|| compile_schema(TURN_DIRECTIVE_SCHEMA));

static GATE_VERDICT_VALIDATOR: LazyLock<Validator> =
    LazyLock::new(|| compile_schema(GATE_VERDICT_SCHEMA));

fn compile_schema(raw: &str) -> Validator {
    let schema: Value = serde_json::from_str(raw).expect("embedded schema should be valid json");
    jsonschema::validator_for(&schema).expect("embedded schema should compile")
}

/// Parse the body of a ```` ```json ```` turn block.
///
/// `updated_stack` is only honoured when it is an array; any other value is
/// treated as absent.
pub fn parse_directive(block: &str) -> Result<TurnDirective, String> {
    let value: Value =
        serde_json::from_str(block).map_err(|err| format!("invalid json: {err}"))?;
    validate(&TURN_DIRECTIVE_VALIDATOR, &value)?;

    let action: TurnAction = serde_json::from_value(value["action"].clone())
        .map_err(|err| format!("invalid action: {err}"))?;
    let updated_stack = match value.get("updated_stack") {
        Some(stack @ Value::Array(_)) => Some(
            serde_json::from_value::<Vec<StackNode>>(stack.clone())
                .map_err(|err| format!("invalid updated_stack: {err}"))?,
        ),
        _ => None,
    };

    Ok(TurnDirective {
        action,
        updated_stack,
    })
}

/// Parse a gate verdict. The response may be bare JSON or wrapped in a
/// ```` ```json ```` fence.
pub fn parse_verdict(text: &str) -> Result<GateVerdict, String> {
    let body = extract_fenced_block(text, FenceTag::Json)
        .map(|block| block.inner())
        .unwrap_or_else(|| text.trim());
    let value: Value = serde_json::from_str(body).map_err(|err| format!("invalid json: {err}"))?;
    validate(&GATE_VERDICT_VALIDATOR, &value)?;
    serde_json::from_value(value).map_err(|err| format!("invalid verdict: {err}"))
}

fn validate(validator: &Validator, value: &Value) -> Result<(), String> {
    let messages: Vec<String> = validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }
    Err(format!("schema validation failed: {}", messages.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{active, waiting};

    #[test]
    fn parses_push_with_stack() {
        let directive = parse_directive(
            r#"{"action":"PUSH","updated_stack":[
                {"id":"root","topic":"Recursion","level":0,"status":"Waiting"},
                {"id":"n1","topic":"Base Case","level":1,"status":"Active"}]}"#,
        )
        .expect("parse");
        assert_eq!(directive.action, TurnAction::Push);
        assert_eq!(
            directive.updated_stack,
            Some(vec![
                waiting("root", "Recursion", 0),
                active("n1", "Base Case", 1)
            ])
        );
    }

    #[test]
    fn non_array_stack_is_ignored() {
        let directive =
            parse_directive(r#"{"action":"STAY","updated_stack":"unchanged"}"#).expect("parse");
        assert_eq!(directive.action, TurnAction::Stay);
        assert!(directive.updated_stack.is_none());
    }

    #[test]
    fn rejects_unknown_action_and_missing_action() {
        let err = parse_directive(r#"{"action":"POP"}"#).expect_err("unknown action");
        assert!(err.contains("schema validation failed"));
        let err = parse_directive(r#"{"updated_stack":[]}"#).expect_err("missing action");
        assert!(err.contains("schema validation failed"));
    }

    #[test]
    fn rejects_malformed_nodes() {
        let err = parse_directive(
            r#"{"action":"PUSH","updated_stack":[{"id":"a","topic":"A","level":-1,"status":"Active"}]}"#,
        )
        .expect_err("negative level");
        assert!(err.contains("schema validation failed"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_directive("{action: PUSH}").expect_err("invalid");
        assert!(err.starts_with("invalid json"));
    }

    #[test]
    fn verdict_accepts_bare_and_fenced_json() {
        let bare = parse_verdict(r#"{"approved":false,"feedback":"too vague"}"#).expect("bare");
        assert!(!bare.approved);
        assert_eq!(bare.feedback, "too vague");

        let fenced =
            parse_verdict("```json\n{\"approved\":true,\"feedback\":\"nice\"}\n```").expect("fenced");
        assert!(fenced.approved);
    }

    #[test]
    fn verdict_requires_both_fields() {
        assert!(parse_verdict(r#"{"approved":true}"#).is_err());
        assert!(parse_verdict("sure, approved").is_err());
    }
}
