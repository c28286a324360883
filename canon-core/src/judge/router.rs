//! Ordered-fallback routing across chat model backends.
//!
//! Every model call the engine makes goes through [`ModelRouter`], which
//! tries a configured list of backend models in priority order with a
//! per-attempt timeout and a per-call deadline. The schedule depends on
//! the failure class: rate limits and timeouts move straight to the next
//! backend, transient server errors retry in place, schema-invalid output
//! moves on. One exhausted pass through the list is terminal for that call.

use async_trait::async_trait;
use groq::Groq;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};

/// Transport-level failure classes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl TransportError {
    /// Transient failures worth retrying against the same backend.
    fn retryable_in_place(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Raw model-call transport: accepts a prompt and a backend model id and
/// returns raw response text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<String, TransportError>;
}

/// A prompt payload for one routed call.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Require a single JSON object from the backend.
    pub json_output: bool,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            max_tokens: 1024,
            // Judgment calls want determinism, not creativity.
            temperature: 0.0,
            json_output: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Router configuration. Backends are configured, never hardcoded at call
/// sites; the defaults mirror the production priority list.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Backend model ids, tried in order.
    pub models: Vec<String>,
    /// Budget for a single attempt against one backend.
    pub attempt_timeout: Duration,
    /// Overall deadline for one routed call across all attempts.
    pub call_deadline: Duration,
    /// Same-backend retries for transient server errors.
    pub max_retries_per_backend: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "qwen/qwen3-32b".to_string(),
                "llama-3.1-8b-instant".to_string(),
                "openai/gpt-oss-120b".to_string(),
                "llama-3.3-70b-versatile".to_string(),
            ],
            attempt_timeout: Duration::from_secs(30),
            call_deadline: Duration::from_secs(120),
            max_retries_per_backend: 2,
        }
    }
}

impl RouterConfig {
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }
}

/// A successful routed response, with the backend that served it.
#[derive(Debug, Clone)]
pub struct Routed<T> {
    pub value: T,
    pub served_by: String,
}

/// Terminal failures of a routed call.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Every backend failed or timed out.
    #[error("all backends exhausted after {attempted} attempt(s)")]
    Exhausted { attempted: usize },

    /// Every backend was tried and none produced schema-valid output.
    #[error("no schema-valid output after {attempted} attempt(s)")]
    MalformedTerminal { attempted: usize },

    #[error("router has no backends configured")]
    NoBackends,
}

impl RouterError {
    /// Both terminal classes degrade the enclosing category the same way.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            RouterError::Exhausted { .. } | RouterError::MalformedTerminal { .. }
        )
    }
}

/// Routes prompts across backends with fallback, timeout, and retry.
pub struct ModelRouter {
    transport: Arc<dyn ChatTransport>,
    config: RouterConfig,
}

impl ModelRouter {
    pub fn new(transport: Arc<dyn ChatTransport>, config: RouterConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a JSON-mode call and parse the response into `T`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &Prompt,
    ) -> Result<Routed<T>, RouterError> {
        let mut prompt = prompt.clone();
        prompt.json_output = true;
        self.route(&prompt, |text| {
            serde_json::from_str(extract_json(text)).map_err(|e| e.to_string())
        })
        .await
    }

    /// Route a plain-text call.
    pub async fn call_text(&self, prompt: &Prompt) -> Result<Routed<String>, RouterError> {
        self.route(prompt, |text| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Err("empty response".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        })
        .await
    }

    async fn route<T>(
        &self,
        prompt: &Prompt,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Routed<T>, RouterError> {
        if self.config.models.is_empty() {
            return Err(RouterError::NoBackends);
        }

        let deadline = Instant::now() + self.config.call_deadline;
        let mut attempted = 0usize;
        let mut saw_malformed = false;

        'backends: for model in &self.config.models {
            let mut retries = 0u32;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    tracing::warn!(model = %model, "call deadline exceeded, cancelling fallback");
                    break 'backends;
                }
                let budget = std::cmp::min(
                    self.config.attempt_timeout,
                    deadline.saturating_duration_since(now),
                );

                attempted += 1;
                let outcome = timeout(budget, self.transport.complete(model, prompt)).await;

                match outcome {
                    Err(_) => {
                        tracing::warn!(model = %model, "attempt timed out, switching backend");
                        continue 'backends;
                    }
                    Ok(Err(err)) => match err {
                        TransportError::RateLimited { .. } | TransportError::Timeout => {
                            tracing::warn!(model = %model, %err, "switching backend");
                            continue 'backends;
                        }
                        err if err.retryable_in_place()
                            && retries < self.config.max_retries_per_backend =>
                        {
                            retries += 1;
                            tracing::warn!(model = %model, %err, retry = retries, "retrying backend");
                        }
                        err => {
                            tracing::warn!(model = %model, %err, "switching backend");
                            continue 'backends;
                        }
                    },
                    Ok(Ok(text)) => match parse(&text) {
                        Ok(value) => {
                            tracing::info!(model = %model, "model call served");
                            return Ok(Routed {
                                value,
                                served_by: model.clone(),
                            });
                        }
                        Err(parse_err) => {
                            saw_malformed = true;
                            tracing::warn!(
                                model = %model,
                                error = %parse_err,
                                "schema-invalid response, switching backend"
                            );
                            continue 'backends;
                        }
                    },
                }
            }
        }

        if saw_malformed {
            tracing::error!(attempted, "routed call terminally malformed");
            Err(RouterError::MalformedTerminal { attempted })
        } else {
            tracing::error!(attempted, "routed call exhausted all backends");
            Err(RouterError::Exhausted { attempted })
        }
    }
}

/// Production transport backed by the Groq client.
#[derive(Clone)]
pub struct GroqTransport {
    client: Groq,
}

impl GroqTransport {
    pub fn new(client: Groq) -> Self {
        Self { client }
    }

    /// Create from the GROQ_API_KEY environment variable.
    pub fn from_env() -> Result<Self, groq::Error> {
        Ok(Self::new(Groq::from_env()?))
    }
}

#[async_trait]
impl ChatTransport for GroqTransport {
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<String, TransportError> {
        let mut messages = Vec::new();
        if let Some(system) = &prompt.system {
            messages.push(groq::Message::system(system));
        }
        messages.push(groq::Message::user(&prompt.user));

        let mut request = groq::Request::new(messages)
            .with_model(model)
            .with_max_tokens(prompt.max_tokens)
            .with_temperature(prompt.temperature);
        if prompt.json_output {
            request = request.with_json_output();
        }

        let response = self.client.complete(request).await.map_err(|e| match e {
            groq::Error::RateLimited { retry_after } => TransportError::RateLimited { retry_after },
            groq::Error::Timeout => TransportError::Timeout,
            groq::Error::Api { status: 401, message } | groq::Error::Api { status: 403, message } => {
                TransportError::Auth(message)
            }
            groq::Error::Api { status, message } => TransportError::Api { status, message },
            groq::Error::Network(msg) => TransportError::Network(msg),
            groq::Error::NoApiKey | groq::Error::Config(_) => {
                TransportError::Auth(e.to_string())
            }
            groq::Error::Parse(msg) => TransportError::Network(msg),
        })?;

        Ok(response.content)
    }
}

/// Extract JSON from a response that might be wrapped in markdown fences.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}
