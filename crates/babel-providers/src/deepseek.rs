//! DeepSeek: an OpenAI-compatible endpoint with its own model list.

use async_trait::async_trait;

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;

use crate::http_provider::{ChatDefaults, OpenAiCompatibleClient};
use crate::registry::{require_api_key, validate_model, validate_temperature};

pub const DEEPSEEK: ChatDefaults = ChatDefaults {
    provider: "deepseek",
    base_url: "https://api.deepseek.com/v1",
    model: "deepseek-chat",
    max_tokens: 8192,
};

#[derive(Debug)]
pub struct DeepSeekClient {
    inner: OpenAiCompatibleClient,
}

impl DeepSeekClient {
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        require_api_key("DeepSeek", config)?;
        if !config.provider.is_empty() && config.provider != "deepseek" {
            return Err(LlmError::config(format!(
                "invalid provider for DeepSeek client: {}",
                config.provider
            )));
        }
        if config.model.is_empty() {
            return Err(LlmError::config("DeepSeek model is required"));
        }
        validate_model("deepseek", &config.model)?;
        validate_temperature("DeepSeek", config)?;

        Ok(Self {
            inner: OpenAiCompatibleClient::with_defaults(config, DEEPSEEK)?,
        })
    }

    pub fn inner(&self) -> &OpenAiCompatibleClient {
        &self.inner
    }
}

#[async_trait]
impl LlmClient for DeepSeekClient {
    async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError> {
        self.inner.translate(text, prompt).await
    }

    fn provider_name(&self) -> &str {
        "deepseek"
    }
}
