//! LLM Client — the single point of entry for all text-generation calls in Ascent.
//!
//! ARCHITECTURAL RULE: No other module may call the completion API directly.
//! All LLM interactions MUST go through this module.
//!
//! Wraps the `/chat/completions` contract with bounded retry, exponential
//! backoff, and per-call failover to a cheaper model after the first
//! retryable failure. Safe to call from many concurrent tasks: the client is
//! `Clone` and holds no mutable state.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Primary model used for generation calls unless a caller overrides it.
pub const PRIMARY_MODEL: &str = "gpt-4o";
/// Cheaper model substituted for the remaining attempts of a call once a
/// retryable failure has occurred. The downgrade never outlives the call.
pub const FALLBACK_MODEL: &str = "gpt-4o-mini";

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// One message in a chat-completion conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Per-call completion options. Callers override only what they need:
/// `CompletionOptions { json_mode: true, ..Default::default() }`.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request a `{"type": "json_object"}` response_format from the provider.
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: PRIMARY_MODEL,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_mode: false,
        }
    }
}

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before attempt N (1-based): base, 2×base, 4×base...
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1 << (attempt - 1))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// The single LLM client used by all services in Ascent.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_retry_policy(base_url, api_key, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
        }
    }

    /// Performs one chat completion and returns the assistant text.
    ///
    /// Retries 429 and 5xx responses (and transport errors) with exponential
    /// backoff; any other error status propagates immediately. After the
    /// first retryable failure the remaining attempts substitute
    /// `FALLBACK_MODEL` for the requested model.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            // Failover: once any retryable failure has been recorded for this
            // call, all further attempts run on the cheaper model.
            let model = if last_error.is_some() {
                FALLBACK_MODEL
            } else {
                opts.model
            };

            let request_body = CompletionRequest {
                model,
                messages,
                temperature: opts.temperature,
                max_tokens: opts.max_tokens,
                response_format: opts.json_mode.then_some(ResponseFormat {
                    format_type: "json_object",
                }),
            };

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse the provider's error envelope
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let completion: CompletionResponse = response.json().await?;
            let text = completion
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or(LlmError::EmptyContent)?;

            debug!(model, chars = text.len(), "LLM call succeeded");
            return Ok(text);
        }

        Err(last_error.unwrap_or(LlmError::RetriesExhausted {
            attempts: self.retry.max_attempts,
        }))
    }

    /// Convenience method that calls the LLM and deserializes the text
    /// response as JSON. The prompt must instruct the model to return valid
    /// JSON; callers normally pair this with `json_mode: true`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<T, LlmError> {
        let text = self.complete(messages, opts).await?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(&text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(server: &MockServer) -> LlmClient {
        LlmClient::with_retry_policy(
            server.uri(),
            "test-key",
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [
                {"message": {"role": "assistant", "content": content}}
            ]
        })
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_completion_options_default_uses_primary_model() {
        let opts = CompletionOptions::default();
        assert_eq!(opts.model, PRIMARY_MODEL);
        assert!(!opts.json_mode);
    }

    #[test]
    fn test_retry_policy_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_complete_returns_assistant_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_rate_limit_retries_on_fallback_model() {
        let server = MockServer::start().await;

        // First request goes out on the primary model and is rate limited.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": PRIMARY_MODEL})))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        // The retry must arrive on the fallback model.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": FALLBACK_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_client_error_propagates_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "unsupported content"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "unsupported content");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_all_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, .. } => assert_eq!(status, 503),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_mode_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                json!({"response_format": {"type": "json_object"}}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("{\"ok\": true}")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let opts = CompletionOptions {
            json_mode: true,
            ..Default::default()
        };
        let value: serde_json::Value = client
            .complete_json(&[ChatMessage::user("hi")], &opts)
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_complete_json_strips_fences() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("```json\n{\"n\": 3}\n```")),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let value: serde_json::Value = client
            .complete_json(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({"n": 3}));
    }
}
