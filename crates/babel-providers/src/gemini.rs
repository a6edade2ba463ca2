//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;

use crate::http_provider::{build_http_client, send_json};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: String,
}

// ─────────────────────────────────────────────
// GeminiClient
// ─────────────────────────────────────────────

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        let timeout = config.timeout().unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            model: config.model_or(DEFAULT_MODEL).to_string(),
            timeout,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Gemini receives the instruction and the source text as one message.
fn build_prompt(text: &str, prompt: &str) -> String {
    let mut full = String::with_capacity(prompt.len() + text.len() + 128);
    if !prompt.is_empty() {
        full.push_str(prompt);
        full.push_str("\n\n");
    }
    full.push_str("Text to translate:\n");
    full.push_str(text);
    full.push_str("\n\n");
    full.push_str(
        "Provide only the translated text without any explanations or additional formatting.",
    );
    full
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError> {
        if text.is_empty() {
            return Err(LlmError::config("text is required"));
        }

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(text, prompt),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 4000,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        };

        debug!(provider = PROVIDER, model = %self.model, bytes = text.len(), "Calling generateContent");

        let request = self
            .client
            .post(self.generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body);

        let response: GenerateResponse = send_json(PROVIDER, self.timeout, request).await?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::invalid_response(PROVIDER, "no candidates in response"))?;

        if candidate.finish_reason != "STOP" {
            return Err(LlmError::invalid_response(
                PROVIDER,
                format!(
                    "generation did not complete successfully: {}",
                    candidate.finish_reason
                ),
            ));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> GeminiClient {
        GeminiClient::new(
            &TranslationConfig::new("gemini")
                .with_api_key("g-key")
                .with_base_url(base),
        )
        .unwrap()
    }

    #[test]
    fn test_build_prompt() {
        let p = build_prompt("Привет", "Translate to Serbian");
        assert!(p.starts_with("Translate to Serbian\n\nText to translate:\nПривет\n\n"));
        assert!(p.ends_with("additional formatting."));
        assert!(build_prompt("x", "").starts_with("Text to translate:"));
    }

    #[test]
    fn test_defaults() {
        let c = GeminiClient::new(&TranslationConfig::new("gemini")).unwrap();
        assert_eq!(c.model, "gemini-pro");
        assert_eq!(c.timeout, Duration::from_secs(60));
        assert_eq!(
            c.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let c = client("http://127.0.0.1:1");
        assert!(c.translate("", "p").await.is_err());
    }

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"topK": 40, "maxOutputTokens": 4000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "  Zdravo "}, {"text": "svete  "}], "role": "model"},
                    "finishReason": "STOP",
                    "index": 0
                }]
            })))
            .mount(&server)
            .await;

        let out = client(&server.uri()).translate("Hello world", "p").await.unwrap();
        assert_eq!(out, "Zdravo svete");
    }

    #[tokio::test]
    async fn test_non_stop_finish_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).translate("x", "p").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri()).translate("x", "p").await.unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }
}
