//! Ollama `/api/generate` client (non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;

use crate::http_provider::{build_http_client, send_json, DEFAULT_TIMEOUT};

const PROVIDER: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3:8b";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        let timeout = config.timeout().unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model_or(DEFAULT_MODEL).to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn translate(&self, _text: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(provider = PROVIDER, model = %self.model, bytes = prompt.len(), "Calling Ollama");

        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let request = self.client.post(url).json(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        });

        let response: GenerateResponse = send_json(PROVIDER, self.timeout, request).await?;
        Ok(response.response)
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_defaults() {
        let client = OllamaClient::new(&TranslationConfig::new("ollama")).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model, "llama3:8b");
        assert_eq!(client.provider_name(), "ollama");
    }

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(serde_json::json!({
                "model": "llama3:8b",
                "prompt": "Translate: hi",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3:8b",
                "created_at": "2024-01-01T00:00:00Z",
                "response": "zdravo",
                "done": true
            })))
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&TranslationConfig::new("ollama").with_base_url(server.uri())).unwrap();
        assert_eq!(client.translate("hi", "Translate: hi").await.unwrap(), "zdravo");
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'x' not found"))
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&TranslationConfig::new("ollama").with_base_url(server.uri())).unwrap();
        let err = client.translate("hi", "p").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
