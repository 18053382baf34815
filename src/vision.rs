//! Vision-model abstraction and the shipped OpenAI-compatible client.
//!
//! The pipeline only ever sees the [`VisionModel`] trait: one synchronous
//! text answer per page image, no streaming. That keeps the extraction loop
//! testable with scripted fakes and lets hosts inject any backend that can
//! look at an image and answer with text.
//!
//! [`OpenAiVisionClient`] is the production implementation, speaking the
//! OpenAI chat-completions wire format (which Azure OpenAI and most local
//! gateways also accept). The page image travels as a `data:` URL inside an
//! `image_url` content part.

use std::time::{Duration, Instant};

use serde_json::json;
use thiserror::Error;

use crate::pipeline::encode::PageImage;

/// Errors emitted by a vision-model call.
///
/// One call maps to at most one error; the per-page retry policy lives in
/// [`crate::pipeline::llm`], not here.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Connection-level failure before a response arrived.
    #[error("transport failure: {0}")]
    Transport(String),

    /// HTTP 401/403; retrying with the same credentials cannot succeed.
    #[error("authentication rejected by '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// Any other non-success HTTP status.
    #[error("API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    /// The call exceeded its deadline; same failure class as transport.
    #[error("model call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// HTTP 429; the caller should back off before retrying.
    #[error("rate limited by the API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The response arrived but carried no usable text.
    #[error("model returned an empty answer")]
    EmptyResponse,
}

impl VisionError {
    /// Whether a retry with the same inputs could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, VisionError::Auth { .. })
    }
}

/// Per-call options passed down from the extraction config.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2500,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A vision-capable model that answers one page image with one text reply.
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    /// Send one page image with the given system prompt; return the raw
    /// answer text. The answer is untrusted and goes through the recovery
    /// parser regardless of how well-formed it looks.
    async fn complete(
        &self,
        system_prompt: &str,
        image: &PageImage,
        options: &CompletionOptions,
    ) -> Result<String, VisionError>;

    /// Short provider label used in logs and error messages.
    fn provider_name(&self) -> &str;
}

/// Default public endpoint; override with
/// [`OpenAiVisionClient::with_base_url`] for Azure or local gateways.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used when the configuration names none.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiVisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

// Manual impl so the API key never reaches log output.
impl std::fmt::Debug for OpenAiVisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiVisionClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiVisionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the model identifier sent with each request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different chat-completions endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the JSON request body for one page call.
    ///
    /// Kept as a separate method so the wire shape is testable without a
    /// network: a system message carrying the prompt text, and a user
    /// message whose only content part is the image as a data URL.
    fn request_body(
        &self,
        system_prompt: &str,
        image: &PageImage,
        options: &CompletionOptions,
    ) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": [
                        { "type": "text", "text": system_prompt }
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": image.to_data_url() }
                        }
                    ]
                }
            ],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        })
    }
}

/// Clip an error-detail string so HTML error pages don't flood the logs.
fn clip_detail(detail: String) -> String {
    const MAX: usize = 300;
    if detail.chars().count() <= MAX {
        detail
    } else {
        detail.chars().take(MAX).collect()
    }
}

#[derive(Debug, serde::Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl VisionModel for OpenAiVisionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        image: &PageImage,
        options: &CompletionOptions,
    ) -> Result<String, VisionError> {
        let started = Instant::now();
        let body = self.request_body(system_prompt, image, options);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VisionError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    VisionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let detail = response.text().await.unwrap_or_default();
            return Err(VisionError::Auth {
                provider: self.provider_name().to_string(),
                detail: clip_detail(detail),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(VisionError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                detail: clip_detail(detail),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Transport(format!("malformed response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(VisionError::EmptyResponse);
        }
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> PageImage {
        PageImage {
            document: 0,
            page: 0,
            data: "dGVzdA==".to_string(),
            media_type: "image/jpeg".to_string(),
            width: 100,
            height: 140,
        }
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        let auth = VisionError::Auth {
            provider: "openai".into(),
            detail: "bad key".into(),
        };
        assert!(!auth.is_retryable());
        assert!(VisionError::Transport("reset".into()).is_retryable());
        assert!(VisionError::Timeout { elapsed_ms: 60_000 }.is_retryable());
        assert!(VisionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn request_body_carries_prompt_and_data_url() {
        let client = OpenAiVisionClient::new("sk-test").with_model("gpt-4o-mini");
        let body = client.request_body("extract things", &test_image(), &CompletionOptions::default());

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 2500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"][0]["text"], "extract things");
        let url = body["messages"][1]["content"][0]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(url.ends_with("dGVzdA=="));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = OpenAiVisionClient::new("sk-test").with_base_url("http://localhost:1234/v1/");
        assert_eq!(client.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let client = OpenAiVisionClient::new("sk-secret-123");
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("sk-secret-123"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn clip_detail_bounds_long_bodies() {
        let long = "x".repeat(1000);
        assert_eq!(clip_detail(long).chars().count(), 300);
        assert_eq!(clip_detail("short".into()), "short");
    }
}
