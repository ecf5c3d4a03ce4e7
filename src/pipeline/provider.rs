//! The analysis-provider boundary: trait, response shapes, and clients.
//!
//! Provider responses are polymorphic: `message.content` may be a plain
//! string or an ordered array of parts, where each part is either a string
//! or an object exposing a `text` field; some providers put `content` at the
//! top level instead of under `message`. The tagged unions here decode that
//! variability once, at the boundary, so the rest of the pipeline only ever
//! sees [`ProviderResponse`] — see [`crate::pipeline::extract`] for the
//! flattening step.
//!
//! Two implementations ship with the crate: [`OpenRouterProvider`] over the
//! OpenRouter chat-completions API, and [`MockProvider`] for tests.

use crate::error::{AnalysisError, MediScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable holding the OpenRouter API key.
pub const OPENROUTER_API_KEY_VAR: &str = "OPENROUTER_API_KEY";

// ── Response shapes ──────────────────────────────────────────────────────

/// One element of a content-part array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// A bare string part.
    Text(String),
    /// An object part exposing a `text` field (other fields ignored).
    Object { text: String },
}

/// The content of a provider message: plain text or a part array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// The message object inside a provider response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMessage {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// A decoded provider response.
///
/// `message.content` is the canonical location; `content` is the top-level
/// fallback some providers use. [`crate::pipeline::extract::feedback_text`]
/// checks both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub message: Option<ProviderMessage>,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ProviderResponse {
    /// A response carrying plain text under `message.content`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            message: Some(ProviderMessage {
                content: Some(MessageContent::Text(text.into())),
            }),
            content: None,
        }
    }

    /// A response carrying a part array under `message.content`.
    pub fn from_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            message: Some(ProviderMessage {
                content: Some(MessageContent::Parts(parts)),
            }),
            content: None,
        }
    }
}

// ── Provider trait ───────────────────────────────────────────────────────

/// An external analysis endpoint.
///
/// Implementations perform exactly one inference call; the timeout race and
/// the degrade policy live in [`crate::pipeline::client`] and the
/// orchestrator respectively.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Analyze the image (a data URI) under the given instructions.
    async fn analyze(
        &self,
        image_data_uri: &str,
        prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError>;
}

// ── OpenRouter client ────────────────────────────────────────────────────

/// Analysis provider backed by the OpenRouter chat-completions API.
#[derive(Debug)]
pub struct OpenRouterProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api/v1";

    /// Create a provider with an explicit API key.
    ///
    /// The HTTP client carries no request timeout of its own — the analysis
    /// client owns the timeout budget and races the whole call against it.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            max_tokens: 2048,
            client: reqwest::Client::new(),
        }
    }

    /// Create a provider from the `OPENROUTER_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>) -> Result<Self, MediScanError> {
        let key = std::env::var(OPENROUTER_API_KEY_VAR)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MediScanError::ProviderNotConfigured {
                hint: format!("Set {OPENROUTER_API_KEY_VAR} to your OpenRouter API key."),
            })?;
        Ok(Self::new(key, model))
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the completion options.
    pub fn with_options(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum RequestPart<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

/// Response body from `POST /chat/completions`.
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ProviderMessage,
}

#[async_trait]
impl AnalysisProvider for OpenRouterProvider {
    async fn analyze(
        &self,
        image_data_uri: &str,
        prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_uri,
                        },
                    },
                ],
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AnalysisError::Provider {
                        detail: format!("Connection to {} failed: {e}", self.base_url),
                    }
                } else {
                    AnalysisError::Provider {
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Provider {
                detail: format!("HTTP {}: {body}", status.as_u16()),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AnalysisError::Provider {
            detail: format!("Response decoding failed: {e}"),
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::Provider {
                detail: "Response contained no choices".into(),
            })?;

        Ok(ProviderResponse {
            message: Some(choice.message),
            content: None,
        })
    }
}

// ── Mock for testing ─────────────────────────────────────────────────────

/// Mock analysis provider returning a configured response or error.
///
/// Used by orchestrator and pipeline tests that need an `AnalysisProvider`
/// without network access. `hang()` builds a provider whose call never
/// settles, for exercising the timeout path.
pub struct MockProvider {
    outcome: Result<ProviderResponse, AnalysisError>,
    delay: Option<std::time::Duration>,
    hang: bool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockProvider {
    /// Respond with plain text under `message.content`.
    pub fn returning_text(text: impl Into<String>) -> Self {
        Self::returning(ProviderResponse::from_text(text))
    }

    /// Respond with an arbitrary pre-built response.
    pub fn returning(response: ProviderResponse) -> Self {
        Self {
            outcome: Ok(response),
            delay: None,
            hang: false,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Fail every call with the given error.
    pub fn failing(error: AnalysisError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            hang: false,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Never settle — the caller's timeout must win the race.
    pub fn hanging() -> Self {
        Self {
            outcome: Ok(ProviderResponse::default()),
            delay: None,
            hang: true,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Sleep before settling (drives timeout-race tests with paused time).
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `analyze` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for MockProvider {
    async fn analyze(
        &self,
        _image_data_uri: &str,
        _prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
