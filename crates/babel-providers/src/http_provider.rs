//! OpenAI-compatible `/chat/completions` client.
//!
//! Serves OpenAI and ZhiPu directly, and is embedded by the DeepSeek and
//! Qwen clients. Also hosts the request/response plumbing every HTTP
//! provider shares (client construction, send, status and body mapping).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;

use crate::registry::{require_api_key, validate_model, validate_temperature};

/// Chat providers get generous deadlines: book sections can be tens of KB.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

// ─────────────────────────────────────────────
// Shared HTTP plumbing
// ─────────────────────────────────────────────

/// Build a pooled HTTP client with a whole-request deadline.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::config(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest failure into the error taxonomy.
pub(crate) fn map_request_error(provider: &str, timeout: Duration, e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            provider: provider.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        LlmError::Transport {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

/// Send `request`, check the status, decode the JSON body.
///
/// Non-2xx responses become [`LlmError::Api`] with the body text preserved.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<T, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_request_error(provider, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        error!(provider, status = %status, body = %body, "API error");
        return Err(LlmError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| map_request_error(provider, timeout, e))?;
    serde_json::from_str(&body).map_err(|e| {
        error!(provider, error = %e, "Failed to parse response");
        LlmError::invalid_response(provider, format!("failed to parse response: {e}"))
    })
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────
// Per-vendor defaults
// ─────────────────────────────────────────────

/// Defaults that distinguish one OpenAI-compatible vendor from another.
#[derive(Clone, Copy, Debug)]
pub struct ChatDefaults {
    pub provider: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
    pub max_tokens: u32,
}

pub const OPENAI: ChatDefaults = ChatDefaults {
    provider: "openai",
    base_url: "https://api.openai.com/v1",
    model: "gpt-4",
    max_tokens: 8192,
};

pub const ZHIPU: ChatDefaults = ChatDefaults {
    provider: "zhipu",
    base_url: "https://open.bigmodel.cn/api/paas/v4",
    model: "glm-4",
    max_tokens: 4000,
};

// ─────────────────────────────────────────────
// OpenAiCompatibleClient
// ─────────────────────────────────────────────

pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    provider: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatibleClient {
    /// Build a client from `config`, filling gaps from `defaults`. No
    /// validation happens here; callers validate what their vendor requires.
    pub fn with_defaults(
        config: &TranslationConfig,
        defaults: ChatDefaults,
    ) -> Result<Self, LlmError> {
        let timeout = config.timeout().unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            client: build_http_client(timeout)?,
            provider: defaults.provider,
            base_url: config
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| defaults.base_url.to_string()),
            api_key: config.api_key.clone(),
            model: config.model_or(defaults.model).to_string(),
            temperature: config.temperature().unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens().unwrap_or(defaults.max_tokens),
            timeout,
        })
    }

    /// OpenAI proper: key required, model from the known list, temperature
    /// in range.
    pub fn openai(config: &TranslationConfig) -> Result<Self, LlmError> {
        require_api_key("OpenAI", config)?;
        if !config.model.is_empty() {
            validate_model("openai", &config.model)?;
        }
        validate_temperature("OpenAI", config)?;
        Self::with_defaults(config, OPENAI)
    }

    /// ZhiPu GLM: key required.
    pub fn zhipu(config: &TranslationConfig) -> Result<Self, LlmError> {
        require_api_key("Zhipu", config)?;
        Self::with_defaults(config, ZHIPU)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full chat completions URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn set_base_url(&mut self, base_url: String) {
        self.base_url = base_url;
    }

    /// Send `prompt` as a single user message, authenticating with `bearer`.
    pub async fn chat(&self, bearer: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(
            provider = self.provider,
            model = %self.model,
            bytes = prompt.len(),
            "Calling chat completions"
        );

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: (self.max_tokens > 0).then_some(self.max_tokens),
            stream: false,
        };

        let request = self
            .client
            .post(self.completions_url())
            .bearer_auth(bearer)
            .json(&body);

        let response: ChatResponse = send_json(self.provider, self.timeout, request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::invalid_response(self.provider, "no choices in response"))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn translate(&self, _text: &str, prompt: &str) -> Result<String, LlmError> {
        self.chat(&self.api_key, prompt).await
    }

    fn provider_name(&self) -> &str {
        self.provider
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
