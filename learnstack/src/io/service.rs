//! Remote reasoning service abstraction.
//!
//! The [`ReasoningService`] trait decouples the session from the hosted model
//! (currently the Gemini `generateContent` endpoint). Tests use scripted
//! services that return canned responses without touching the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::ServiceConfig;

/// Output constraint requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free text (may embed fenced blocks).
    Text,
    /// A single JSON document.
    Json,
}

/// Parameters for one generation call.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Credential forwarded to the service.
    pub api_key: String,
    /// Fully composed prompt.
    pub prompt: String,
    pub format: ResponseFormat,
}

impl fmt::Debug for GenerateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateRequest")
            .field("api_key", &"<redacted>")
            .field("prompt_chars", &self.prompt.chars().count())
            .field("format", &self.format)
            .finish()
    }
}

/// Failures of the remote call itself. Content problems inside a successful
/// response are handled by the reconciler, not reported here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an error payload or a non-success status.
    #[error("service error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body was not the expected envelope.
    #[error("malformed service response: {0}")]
    Malformed(String),

    /// The response envelope carried no generated text.
    #[error("service returned no text")]
    EmptyResponse,
}

/// Abstraction over generative backends.
pub trait ReasoningService {
    /// Run one generation. Called at most once per user-initiated trigger.
    fn generate(&self, request: &GenerateRequest) -> Result<String, ServiceError>;
}

/// Service backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiService {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl GeminiService {
    pub fn new(config: &ServiceConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.trim().to_string(),
            agent,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl ReasoningService for GeminiService {
    #[instrument(skip_all, fields(model = %self.model, format = ?request.format))]
    fn generate(&self, request: &GenerateRequest) -> Result<String, ServiceError> {
        let body = GenerateContentRequest::new(request);
        debug!(prompt_chars = request.prompt.chars().count(), "calling generateContent");

        let mut response = self
            .agent
            .post(&self.endpoint())
            .header("x-goog-api-key", &request.api_key)
            .header("content-type", "application/json")
            .send_json(&body)
            .map_err(|err| ServiceError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let raw = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ServiceError::Transport(err.to_string()))?;

        let text = extract_text(status, &raw);
        if let Err(err) = &text {
            warn!(status, error = %err, "generateContent failed");
        }
        text
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(request: &'a GenerateRequest) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: match request.format {
                ResponseFormat::Text => None,
                ResponseFormat::Json => Some(GenerationConfig {
                    response_mime_type: "application/json",
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a raw HTTP status and body to generated text or a service error.
fn extract_text(status: u16, raw: &str) -> Result<String, ServiceError> {
    let parsed = serde_json::from_str::<GenerateContentResponse>(raw);

    if let Ok(GenerateContentResponse {
        error: Some(error), ..
    }) = &parsed
    {
        return Err(ServiceError::Api {
            status,
            message: error.message.clone(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(ServiceError::Api {
            status,
            message: truncate(raw.trim(), 200),
        });
    }

    let response = parsed.map_err(|err| ServiceError::Malformed(err.to_string()))?;
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::EmptyResponse);
    }
    Ok(text)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_adds_mime_type_only_for_json() {
        let mut request = GenerateRequest {
            api_key: "k".to_string(),
            prompt: "hello".to_string(),
            format: ResponseFormat::Text,
        };
        let text_body = serde_json::to_value(GenerateContentRequest::new(&request)).expect("json");
        assert_eq!(text_body["contents"][0]["parts"][0]["text"], "hello");
        assert!(text_body.get("generationConfig").is_none());

        request.format = ResponseFormat::Json;
        let json_body = serde_json::to_value(GenerateContentRequest::new(&request)).expect("json");
        assert_eq!(
            json_body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn extracts_concatenated_candidate_text() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]}}]}"#;
        assert_eq!(extract_text(200, raw).expect("text"), "Hello there");
    }

    #[test]
    fn error_payload_becomes_api_error() {
        let raw = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = extract_text(400, raw).expect_err("error");
        assert_eq!(
            err,
            ServiceError::Api {
                status: 400,
                message: "API key not valid".to_string()
            }
        );
    }

    #[test]
    fn non_json_failure_status_is_api_error() {
        let err = extract_text(503, "upstream unavailable").expect_err("error");
        assert!(matches!(err, ServiceError::Api { status: 503, .. }));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn empty_candidates_are_reported() {
        assert_eq!(
            extract_text(200, r#"{"candidates":[]}"#),
            Err(ServiceError::EmptyResponse)
        );
    }

    #[test]
    fn garbage_success_body_is_malformed() {
        assert!(matches!(
            extract_text(200, "<html>"),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let request = GenerateRequest {
            api_key: "secret-key".to_string(),
            prompt: "p".to_string(),
            format: ResponseFormat::Text,
        };
        assert!(!format!("{request:?}").contains("secret-key"));
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        let service = GeminiService::new(&ServiceConfig {
            base_url: "http://localhost:9999/".to_string(),
            model: "gemini-test".to_string(),
            api_key_env: "X".to_string(),
        });
        assert_eq!(
            service.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
    }
}
