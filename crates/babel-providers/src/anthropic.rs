//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;

use crate::http_provider::{
    build_http_client, send_json, ChatMessage, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT,
};
use crate::registry::{require_api_key, validate_model};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicClient {
    /// Key and an explicit, known model are both required.
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        require_api_key("Anthropic", config)?;
        if config.model.is_empty() {
            return Err(LlmError::config("model must be specified for Anthropic client"));
        }
        validate_model(PROVIDER, &config.model)?;

        let timeout = config.timeout().unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature().unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS),
            timeout,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn translate(&self, _text: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(provider = PROVIDER, model = %self.model, bytes = prompt.len(), "Calling messages API");

        let body = MessagesRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let response: MessagesResponse = send_json(PROVIDER, self.timeout, request).await?;
        response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| LlmError::invalid_response(PROVIDER, "no content in response"))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::error::ErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> TranslationConfig {
        TranslationConfig::new("anthropic")
            .with_api_key("sk-ant-test")
            .with_model("claude-3-sonnet-20240229")
    }

    #[test]
    fn test_model_validation() {
        for model in [
            "claude-3-opus-20240229",
            "claude-3-sonnet-20240229",
            "claude-3-haiku-20240307",
        ] {
            assert!(AnthropicClient::new(&config().with_model(model)).is_ok(), "{model}");
        }
        for model in ["invalid-model", "gpt-4", "claude-2", ""] {
            let err = AnthropicClient::new(&config().with_model(model)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{model}");
        }
    }

    #[test]
    fn test_requires_key() {
        let cfg = TranslationConfig::new("anthropic").with_model("claude-3-haiku-20240307");
        assert!(AnthropicClient::new(&cfg)
            .unwrap_err()
            .to_string()
            .contains("Anthropic API key is required"));
    }

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-3-sonnet-20240229",
                "max_tokens": 4096
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Здраво свете"}],
                "usage": {"input_tokens": 10, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(&config().with_base_url(server.uri())).unwrap();
        assert_eq!(client.translate("x", "p").await.unwrap(), "Здраво свете");
    }

    #[tokio::test]
    async fn test_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;

        let client = AnthropicClient::new(&config().with_base_url(server.uri())).unwrap();
        let err = client.translate("x", "p").await.unwrap_err();
        assert!(err.to_string().contains("no content in response"));
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"message":"prompt is too long: 250000 tokens"}}"#,
            ))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(&config().with_base_url(server.uri())).unwrap();
        let err = client.translate("x", "p").await.unwrap_err();
        assert!(err.to_string().contains("status 400"));
        assert!(err.is_size_error());
    }
}
