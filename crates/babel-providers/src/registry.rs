//! Provider registry: static specs for every supported backend.
//!
//! Each [`ProviderSpec`] carries display metadata, the API-key environment
//! variable, the known model list and a constructor. Dispatch is a lookup in
//! [`PROVIDERS`], never a runtime-mutable map.

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;
use babel_local::LlamaCppClient;
use tracing::debug;

use crate::anthropic::AnthropicClient;
use crate::deepseek::DeepSeekClient;
use crate::gemini::GeminiClient;
use crate::http_provider::OpenAiCompatibleClient;
use crate::ollama::OllamaClient;
use crate::qwen::QwenClient;

/// Builds a boxed client from a per-client config.
pub type Constructor = fn(&TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError>;

// ─────────────────────────────────────────────
// ProviderSpec
// ─────────────────────────────────────────────

/// Static description of one provider.
pub struct ProviderSpec {
    /// Internal name (e.g. `"openai"`).
    pub name: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Environment variable consulted when no API key is configured.
    pub env_key: Option<&'static str>,
    pub default_base_url: Option<&'static str>,
    pub default_model: &'static str,
    /// Accepted models. Empty means "anything goes".
    pub valid_models: &'static [&'static str],
    /// Whether a key (or OAuth credentials, for Qwen) is needed.
    pub needs_api_key: bool,
    /// Runs on this machine rather than a vendor API.
    pub is_local: bool,
    pub constructor: Constructor,
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .finish()
    }
}

fn boxed<C: LlmClient + 'static>(client: Result<C, LlmError>) -> Result<Box<dyn LlmClient>, LlmError> {
    client.map(|c| Box::new(c) as Box<dyn LlmClient>)
}

fn new_openai(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(OpenAiCompatibleClient::openai(c))
}

fn new_anthropic(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(AnthropicClient::new(c))
}

fn new_zhipu(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(OpenAiCompatibleClient::zhipu(c))
}

fn new_deepseek(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(DeepSeekClient::new(c))
}

fn new_qwen(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(QwenClient::new(c))
}

fn new_gemini(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(GeminiClient::new(c))
}

fn new_ollama(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(OllamaClient::new(c))
}

fn new_llamacpp(c: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    boxed(LlamaCppClient::new(c))
}

// ─────────────────────────────────────────────
// All providers
// ─────────────────────────────────────────────

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        env_key: Some("OPENAI_API_KEY"),
        default_base_url: Some("https://api.openai.com/v1"),
        default_model: "gpt-4",
        valid_models: &[
            "gpt-4",
            "gpt-4-turbo",
            "gpt-4o",
            "gpt-4o-mini",
            "gpt-3.5-turbo",
        ],
        needs_api_key: true,
        is_local: false,
        constructor: new_openai,
    },
    ProviderSpec {
        name: "anthropic",
        display_name: "Anthropic",
        env_key: Some("ANTHROPIC_API_KEY"),
        default_base_url: Some("https://api.anthropic.com/v1"),
        default_model: "claude-3-sonnet-20240229",
        valid_models: &[
            "claude-3-opus-20240229",
            "claude-3-sonnet-20240229",
            "claude-3-haiku-20240307",
            "claude-3-5-sonnet-20241022",
            "claude-3-5-haiku-20241022",
        ],
        needs_api_key: true,
        is_local: false,
        constructor: new_anthropic,
    },
    ProviderSpec {
        name: "zhipu",
        display_name: "ZhiPu AI",
        env_key: Some("ZHIPU_API_KEY"),
        default_base_url: Some("https://open.bigmodel.cn/api/paas/v4"),
        default_model: "glm-4",
        valid_models: &[],
        needs_api_key: true,
        is_local: false,
        constructor: new_zhipu,
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        env_key: Some("DEEPSEEK_API_KEY"),
        default_base_url: Some("https://api.deepseek.com/v1"),
        default_model: "deepseek-chat",
        valid_models: &["deepseek-chat", "deepseek-coder", "deepseek-reasoner"],
        needs_api_key: true,
        is_local: false,
        constructor: new_deepseek,
    },
    ProviderSpec {
        name: "qwen",
        display_name: "Qwen (DashScope)",
        env_key: Some("QWEN_API_KEY"),
        default_base_url: Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        default_model: "qwen-plus",
        valid_models: &[],
        needs_api_key: true,
        is_local: false,
        constructor: new_qwen,
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Google Gemini",
        env_key: Some("GEMINI_API_KEY"),
        default_base_url: Some("https://generativelanguage.googleapis.com/v1beta"),
        default_model: "gemini-pro",
        valid_models: &[],
        needs_api_key: true,
        is_local: false,
        constructor: new_gemini,
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama",
        env_key: None,
        default_base_url: Some("http://localhost:11434"),
        default_model: "llama3:8b",
        valid_models: &[],
        needs_api_key: false,
        is_local: true,
        constructor: new_ollama,
    },
    ProviderSpec {
        name: "llamacpp",
        display_name: "llama.cpp",
        env_key: None,
        default_base_url: None,
        default_model: "auto",
        valid_models: &[],
        needs_api_key: false,
        is_local: true,
        constructor: new_llamacpp,
    },
];

// ─────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────

/// Find a provider spec by its internal name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name == name)
}

/// Comma-separated provider names, for error messages and help text.
pub fn provider_names() -> String {
    PROVIDERS
        .iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the client for `config.provider`.
///
/// An empty `api_key` is filled from the provider's environment variable
/// before construction.
pub fn create_client(config: &TranslationConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    let spec = find_by_name(&config.provider).ok_or_else(|| {
        LlmError::config(format!("unsupported LLM provider: {}", config.provider))
    })?;

    let mut config = config.clone();
    if config.api_key.is_empty() {
        if let Some(key) = spec
            .env_key
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
        {
            debug!(provider = spec.name, "Using API key from environment");
            config.api_key = key;
        }
    }

    debug!(
        provider = spec.name,
        model = %config.model_or(spec.default_model),
        base_url = config.base_url.as_deref().unwrap_or("default"),
        "Creating LLM client"
    );

    (spec.constructor)(&config)
}

// ─────────────────────────────────────────────
// Validation helpers shared by constructors
// ─────────────────────────────────────────────

pub(crate) fn require_api_key(display: &str, config: &TranslationConfig) -> Result<(), LlmError> {
    if config.api_key.is_empty() {
        return Err(LlmError::config(format!("{display} API key is required")));
    }
    Ok(())
}

/// Reject models outside the provider's known list.
pub(crate) fn validate_model(provider: &str, model: &str) -> Result<(), LlmError> {
    if model.trim().is_empty() {
        return Err(LlmError::config("model cannot be empty or whitespace"));
    }
    let Some(spec) = find_by_name(provider) else {
        return Ok(());
    };
    if spec.valid_models.is_empty() || spec.valid_models.contains(&model) {
        return Ok(());
    }
    Err(LlmError::config(format!(
        "model '{}' is not valid for {}. Valid models: {}",
        model,
        provider,
        spec.valid_models.join(", ")
    )))
}

/// Temperature, when given, must lie in `0.0..=2.0`.
pub(crate) fn validate_temperature(display: &str, config: &TranslationConfig) -> Result<(), LlmError> {
    match config.temperature() {
        Some(t) if !(0.0..=2.0).contains(&t) => Err(LlmError::config(format!(
            "temperature {t:.1} is invalid for {display}. Must be between 0.0 and 2.0"
        ))),
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::error::ErrorKind;
    use serial_test::serial;

    #[test]
    fn test_all_providers_present() {
        for name in [
            "openai", "anthropic", "zhipu", "deepseek", "qwen", "gemini", "ollama", "llamacpp",
        ] {
            assert!(find_by_name(name).is_some(), "missing {name}");
        }
        assert!(find_by_name("nonexistent").is_none());
    }

    #[test]
    fn test_unique_names() {
        let mut names: Vec<&str> = PROVIDERS.iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PROVIDERS.len());
    }

    #[test]
    fn test_unsupported_provider() {
        let err = create_client(&TranslationConfig::new("babelfish")).err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "configuration error: unsupported LLM provider: babelfish"
        );
    }

    #[test]
    fn test_create_client_names() {
        let cases = [
            TranslationConfig::new("openai").with_api_key("k"),
            TranslationConfig::new("anthropic")
                .with_api_key("k")
                .with_model("claude-3-haiku-20240307"),
            TranslationConfig::new("zhipu").with_api_key("k"),
            TranslationConfig::new("deepseek")
                .with_api_key("k")
                .with_model("deepseek-chat"),
            TranslationConfig::new("qwen").with_api_key("k"),
            TranslationConfig::new("gemini").with_api_key("k"),
            TranslationConfig::new("ollama"),
        ];
        for config in cases {
            let client = create_client(&config).unwrap();
            assert_eq!(client.provider_name(), config.provider);
        }
    }

    #[test]
    #[serial]
    fn test_env_key_fallback() {
        std::env::remove_var("OPENAI_API_KEY");
        assert!(create_client(&TranslationConfig::new("openai")).is_err());

        std::env::set_var("OPENAI_API_KEY", "sk-env");
        let client = create_client(&TranslationConfig::new("openai"));
        std::env::remove_var("OPENAI_API_KEY");
        assert!(client.is_ok());
    }

    #[test]
    fn test_validate_model() {
        assert!(validate_model("openai", "gpt-4o").is_ok());
        assert!(validate_model("openai", "   ").is_err());
        let err = validate_model("deepseek", "gpt-4").unwrap_err();
        assert!(err.to_string().contains("deepseek-chat"));
        // No list: anything goes.
        assert!(validate_model("zhipu", "glm-4-plus").is_ok());
    }

    #[test]
    fn test_validate_temperature() {
        let ok = TranslationConfig::new("openai").with_option("temperature", 2.0);
        assert!(validate_temperature("OpenAI", &ok).is_ok());
        let bad = TranslationConfig::new("openai").with_option("temperature", 2.1);
        assert!(validate_temperature("OpenAI", &bad)
            .unwrap_err()
            .to_string()
            .contains("between 0.0 and 2.0"));
    }
}
