//! Qwen (Alibaba Cloud) client: API key or OAuth bearer.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;
use babel_core::utils::expand_home;

use crate::http_provider::{ChatDefaults, OpenAiCompatibleClient};
use crate::oauth::{OAuthToken, TokenManager};

pub const QWEN: ChatDefaults = ChatDefaults {
    provider: "qwen",
    base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
    model: "qwen-plus",
    max_tokens: 4000,
};

#[derive(Debug)]
pub struct QwenClient {
    chat: OpenAiCompatibleClient,
    api_key: String,
    tokens: Option<TokenManager>,
}

/// Base URL advertised by an OAuth token, if any.
fn resource_base_url(token: &OAuthToken) -> Option<String> {
    let resource = token.resource_url.trim().trim_end_matches('/');
    if resource.is_empty() {
        return None;
    }
    if resource.starts_with("http://") || resource.starts_with("https://") {
        Some(format!("{resource}/v1"))
    } else {
        Some(format!("https://{resource}/v1"))
    }
}

impl QwenClient {
    /// With an API key the key is used as is. Without one, OAuth credentials
    /// are loaded from `credentials_path` (or the default locations).
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        let mut chat = OpenAiCompatibleClient::with_defaults(config, QWEN)?;

        if !config.api_key.is_empty() {
            return Ok(Self {
                chat,
                api_key: config.api_key.clone(),
                tokens: None,
            });
        }

        let credentials: Option<PathBuf> = config.option_str("credentials_path").map(expand_home);
        let tokens = TokenManager::load(credentials.as_deref(), config.option_str("token_url"))?;
        Self::apply_resource_url(&mut chat, config, &tokens);

        Ok(Self {
            chat,
            api_key: String::new(),
            tokens: Some(tokens),
        })
    }

    /// OAuth-only client around an existing token manager.
    pub fn with_token_manager(
        config: &TranslationConfig,
        tokens: TokenManager,
    ) -> Result<Self, LlmError> {
        let mut chat = OpenAiCompatibleClient::with_defaults(config, QWEN)?;
        Self::apply_resource_url(&mut chat, config, &tokens);
        Ok(Self {
            chat,
            api_key: String::new(),
            tokens: Some(tokens),
        })
    }

    fn apply_resource_url(
        chat: &mut OpenAiCompatibleClient,
        config: &TranslationConfig,
        tokens: &TokenManager,
    ) {
        if config.base_url.as_deref().is_some_and(|u| !u.is_empty()) {
            return;
        }
        let base = tokens.try_token().as_ref().and_then(resource_base_url);
        if let Some(base) = base {
            chat.set_base_url(base);
        }
    }

    pub fn base_url(&self) -> &str {
        self.chat.base_url()
    }

    pub fn token_manager(&self) -> Option<&TokenManager> {
        self.tokens.as_ref()
    }
}

#[async_trait]
impl LlmClient for QwenClient {
    async fn translate(&self, _text: &str, prompt: &str) -> Result<String, LlmError> {
        if !self.api_key.is_empty() {
            return self.chat.chat(&self.api_key, prompt).await;
        }

        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| LlmError::config("no authentication credentials available"))?;
        let token = tokens
            .valid_token()
            .await
            .ok_or_else(|| LlmError::config("no authentication credentials available"))?;

        match self.chat.chat(&token.access_token, prompt).await {
            Err(LlmError::Api { status: 401, provider, body }) => {
                warn!("Qwen rejected the OAuth token, refreshing and retrying once");
                match tokens.refresh_after_rejection(&token.access_token).await {
                    Ok(fresh) => self.chat.chat(&fresh.access_token, prompt).await,
                    Err(e) => {
                        warn!(error = %e, "Qwen token refresh failed");
                        Err(LlmError::Api {
                            provider,
                            status: 401,
                            body,
                        })
                    }
                }
            }
            other => other,
        }
    }

    fn provider_name(&self) -> &str {
        "qwen"
    }
}
