//! Content generator adapter.
//!
//! A [`ContentGenerator`] turns a fully composed prompt into text. Prompt
//! construction belongs to the caller. [`GeminiGenerator`] talks to the
//! Generative Language API and extracts text with [`decode_response`].

mod decode;

use async_trait::async_trait;
use draftsmith_shared::{CallPolicy, DraftsmithError, GeneratorConfig, Result, with_policy};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

pub use decode::{GeneratedText, ResponseShape, decode_response};

/// Service label used in errors and logs.
const SERVICE: &str = "generator";

/// Header carrying the API key. Keeps the key out of request URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Capability to generate text from a prompt.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate text for `prompt`.
    ///
    /// An unrecognised response shape is not an error: the returned text is
    /// the sentinel and [`GeneratedText::is_sentinel`] is true.
    async fn generate(&self, prompt: &str) -> Result<GeneratedText>;
}

// ---------------------------------------------------------------------------
// GeminiGenerator
// ---------------------------------------------------------------------------

/// [`ContentGenerator`] backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: Client,
    endpoint: Url,
    api_key: String,
    policy: CallPolicy,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl GeminiGenerator {
    /// Build a generator for `config.model`.
    pub fn new(config: &GeneratorConfig, api_key: String, policy: CallPolicy) -> Result<Self> {
        let mut endpoint = Url::parse(&config.base_url).map_err(|e| {
            DraftsmithError::config(format!("invalid generator base_url '{}': {e}", config.base_url))
        })?;
        let method = format!("{}:generateContent", config.model);
        endpoint
            .path_segments_mut()
            .map_err(|_| DraftsmithError::config("generator base_url cannot be a base"))?
            .pop_if_empty()
            .extend(["v1beta", "models", method.as_str()]);

        let client = Client::builder()
            .user_agent(concat!("Draftsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DraftsmithError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            policy,
        })
    }

    async fn call(&self, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, &detail));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| DraftsmithError::upstream(SERVICE, format!("unreadable response body: {e}")))
    }

    fn redact(&self, message: &str) -> String {
        if self.api_key.is_empty() {
            message.to_string()
        } else {
            message.replace(&self.api_key, "[redacted]")
        }
    }

    fn request_error(&self, e: reqwest::Error) -> DraftsmithError {
        let message = self.redact(&e.to_string());
        if e.is_timeout() || e.is_connect() {
            DraftsmithError::transient(SERVICE, message)
        } else {
            DraftsmithError::upstream(SERVICE, message)
        }
    }

    fn status_error(&self, status: StatusCode, body: &str) -> DraftsmithError {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from));
        let message = match detail {
            Some(detail) => format!("HTTP {status}: {}", self.redact(&detail)),
            None => format!("HTTP {status}"),
        };

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            DraftsmithError::transient(SERVICE, message)
        } else {
            DraftsmithError::upstream(SERVICE, message)
        }
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedText> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let raw = with_policy(&self.policy, SERVICE, || self.call(&body)).await?;
        let generated = decode_response(&raw);

        debug!(shape = ?generated.shape, len = generated.text.len(), "generation complete");
        Ok(generated)
    }
}
