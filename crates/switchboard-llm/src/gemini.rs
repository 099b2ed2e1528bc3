//! Gemini `generateContent` backend.
//!
//! Sends the whole conversation on every round-trip (the API is stateless)
//! together with the merged function declarations and the system
//! instruction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};

use crate::backend::{ChatModel, DEFAULT_MODEL_RETRIES, DEFAULT_MODEL_RETRY_DELAY, with_retry};
use crate::error::{LlmError, Result};
use crate::types::{
    ChatRequest, Content, FunctionCall, FunctionDeclaration, FunctionResponse, ModelTurn, Part,
    Role,
};

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini backend.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Model to use.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Fixed delay between retries.
    pub retry_delay: Duration,

    /// Name for this backend instance.
    pub name: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MODEL_RETRIES,
            retry_delay: DEFAULT_MODEL_RETRY_DELAY,
            name: "gemini".to_string(),
        }
    }

    /// Read the API key from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(LlmError::Config(format!(
                "{} environment variable not set",
                var
            ))),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini chat backend.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    async fn handle_response(response: Response) -> Result<ModelTurn> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), &body));
        }
        parse_response(&body)
    }
}

#[async_trait]
impl ChatModel for GeminiBackend {
    async fn send(&self, request: ChatRequest) -> Result<ModelTurn> {
        let body = GenerateContentRequest::from_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %self.config.model,
            contents = request.history.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_delay,
            &self.config.name,
            || async {
                let response = self
                    .client
                    .post(self.generate_url())
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-goog-api-key", &self.config.api_key)
                    .json(&body)
                    .send()
                    .await?;
                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireToolGroup<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction<'a>>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a ChatRequest) -> Self {
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireToolGroup {
                function_declarations: &request.tools,
            }]
        };
        Self {
            contents: &request.history,
            tools,
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|text| WireSystemInstruction {
                    parts: vec![WireTextPart { text }],
                }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Debug, Serialize)]
struct WireSystemInstruction<'a> {
    parts: Vec<WireTextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

/// Response parts may carry extra keys (`thought`, `thoughtSignature`), so
/// they are read field by field instead of as a tagged [`Part`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
    #[serde(default)]
    function_response: Option<FunctionResponse>,
    #[serde(default)]
    thought: bool,
}

impl WirePart {
    fn into_part(self) -> Option<Part> {
        if let Some(call) = self.function_call {
            Some(Part::FunctionCall(call))
        } else if let Some(response) = self.function_response {
            Some(Part::FunctionResponse(response))
        } else if self.thought {
            None
        } else {
            self.text.map(Part::Text)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Parse a successful `generateContent` body into a model turn.
fn parse_response(body: &str) -> Result<ModelTurn> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)?;

    let block_reason = parsed.prompt_feedback.and_then(|f| f.block_reason);
    if let Some(reason) = &block_reason {
        tracing::warn!(reason = %reason, "Prompt was blocked by the model");
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Ok(ModelTurn {
            content: None,
            finish_reason: None,
            block_reason,
        });
    };

    let content = candidate.content.map(|c| {
        Content::new(
            Role::Model,
            c.parts.into_iter().filter_map(WirePart::into_part).collect(),
        )
    });

    Ok(ModelTurn {
        content,
        finish_reason: candidate.finish_reason,
        block_reason,
    })
}

/// Map a non-success HTTP status to an error.
fn error_for_status(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => LlmError::Auth(message),
        429 => LlmError::RateLimit(message),
        500..=599 => LlmError::Server { status, message },
        _ => LlmError::Backend(format!("HTTP {}: {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Schema, SchemaType};
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest::new(vec![Content::user("hello")])
            .with_tools(vec![FunctionDeclaration {
                name: "echo".to_string(),
                description: "Echo back the input".to_string(),
                parameters: Schema::empty_object(),
            }])
            .with_system_instruction("Be brief");

        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "tools": [{
                    "functionDeclarations": [{
                        "name": "echo",
                        "description": "Echo back the input",
                        "parameters": {"type": "OBJECT", "properties": {}, "required": []}
                    }]
                }],
                "systemInstruction": {"parts": [{"text": "Be brief"}]}
            })
        );
    }

    #[test]
    fn test_request_body_without_tools() {
        let request = ChatRequest::new(vec![Content::user("hi")]);
        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_function_responses_serialize_with_function_role() {
        let request = ChatRequest::new(vec![Content::function_responses(vec![
            FunctionResponse::from_text("add", "3"),
        ])]);
        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert_eq!(
            body["contents"][0],
            json!({
                "role": "function",
                "parts": [{"functionResponse": {"name": "add", "response": {"content": "3"}}}]
            })
        );
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": "there"}]},
                "finishReason": "STOP"
            }]
        })
        .to_string();

        let turn = parse_response(&body).unwrap();
        assert_eq!(turn.joined_text().as_deref(), Some("Hello there"));
        assert_eq!(turn.finish_reason.as_deref(), Some("STOP"));
        assert!(turn.block_reason.is_none());
    }

    #[test]
    fn test_parse_function_call_with_extra_keys() {
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking", "thought": true},
                        {"functionCall": {"name": "add", "args": {"a": 1, "b": 2}}, "thoughtSignature": "abc"}
                    ]
                },
                "finishReason": "STOP"
            }]
        })
        .to_string();

        let turn = parse_response(&body).unwrap();
        let calls = turn.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add");
        assert_eq!(calls[0].args, json!({"a": 1, "b": 2}));
        assert!(turn.joined_text().is_none());
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let turn = parse_response(&body).unwrap();
        assert_eq!(turn.block_reason.as_deref(), Some("SAFETY"));
        assert!(turn.content.is_none());
    }

    #[test]
    fn test_parse_finish_reason_without_content() {
        let body = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}).to_string();
        let turn = parse_response(&body).unwrap();
        assert!(turn.content.is_none());
        assert!(!turn.stopped_normally());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_response("not json"),
            Err(LlmError::Serialization(_))
        ));
    }

    #[test]
    fn test_error_for_status() {
        let body = json!({"error": {"code": 503, "message": "overloaded"}}).to_string();
        let err = error_for_status(503, &body);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Server error 503: overloaded");

        assert!(matches!(error_for_status(401, "{}"), LlmError::Auth(_)));
        assert!(matches!(error_for_status(429, "slow down"), LlmError::RateLimit(_)));

        let err = error_for_status(400, "bad request");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Backend error: HTTP 400: bad request");
    }

    #[test]
    fn test_config_from_env_missing() {
        let err = GeminiConfig::from_env("SWITCHBOARD_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_generate_url_and_name() {
        let backend = GeminiBackend::new(
            GeminiConfig::new("key")
                .with_base_url("http://localhost:9999/v1beta/")
                .with_model("gemini-test"),
        )
        .unwrap();
        assert_eq!(
            backend.generate_url(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(backend.name(), "gemini-test");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = GeminiConfig::new("secret-key");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert_eq!(config.retry_delay, Duration::from_millis(1500));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_schema_type_tags() {
        let value = serde_json::to_value(Schema::of(SchemaType::Integer)).unwrap();
        assert_eq!(value, json!({"type": "INTEGER"}));
    }
}
