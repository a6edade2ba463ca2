//! Configuration schema.
//!
//! Hierarchy: `Config` → `TranslationDefaults`, `ProvidersConfig`,
//! `LocalConfig`, `OAuthConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ModelConfig, TranslationConfig};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.babel/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub translation: TranslationDefaults,
    pub providers: ProvidersConfig,
    pub local: LocalConfig,
    pub oauth: OAuthConfig,
}

impl Config {
    /// Build the per-client [`TranslationConfig`] for `provider` (or the
    /// configured default provider).
    pub fn translation_config(&self, provider: Option<&str>) -> TranslationConfig {
        let name = provider.unwrap_or(&self.translation.provider).to_string();
        let provider_cfg = self.providers.get_by_name(&name).cloned().unwrap_or_default();

        let mut cfg = TranslationConfig {
            provider: name,
            model: self.translation.model.clone(),
            api_key: provider_cfg.api_key,
            base_url: provider_cfg.api_base,
            source_lang: self.translation.source_lang.clone(),
            target_lang: self.translation.target_lang.clone(),
            ..Default::default()
        };
        cfg.options
            .insert("temperature".into(), Value::from(self.translation.temperature));
        cfg.options
            .insert("max_tokens".into(), Value::from(self.translation.max_tokens));
        if let Some(secs) = self.translation.timeout_secs {
            cfg.options.insert("timeout_secs".into(), Value::from(secs));
        }
        if let Some(path) = &self.oauth.credentials_path {
            cfg.options
                .insert("credentials_path".into(), Value::from(path.clone()));
        }
        if let Some(url) = &self.oauth.token_url {
            cfg.options.insert("token_url".into(), Value::from(url.clone()));
        }
        if let Some(path) = &self.local.binary_path {
            cfg.options.insert("binary_path".into(), Value::from(path.clone()));
        }
        if let Some(dir) = &self.local.models_dir {
            cfg.options.insert("models_dir".into(), Value::from(dir.clone()));
        }
        cfg
    }
}

// ─────────────────────────────────────────────
// Translation defaults
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslationDefaults {
    /// Default provider name.
    pub provider: String,
    /// Default model. Empty means "provider default".
    pub model: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-request timeout override in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for TranslationDefaults {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: String::new(),
            source_lang: "ru".to_string(),
            target_lang: "sr".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: None,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// API key and base URL for a single provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub zhipu: ProviderConfig,
    pub qwen: ProviderConfig,
    pub gemini: ProviderConfig,
    pub ollama: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by name (e.g. `"anthropic"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "anthropic" => Some(&self.anthropic),
            "deepseek" => Some(&self.deepseek),
            "zhipu" => Some(&self.zhipu),
            "qwen" => Some(&self.qwen),
            "gemini" => Some(&self.gemini),
            "ollama" => Some(&self.ollama),
            _ => None,
        }
    }

    pub(crate) fn get_mut_by_name(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openai" => Some(&mut self.openai),
            "anthropic" => Some(&mut self.anthropic),
            "deepseek" => Some(&mut self.deepseek),
            "zhipu" => Some(&mut self.zhipu),
            "qwen" => Some(&mut self.qwen),
            "gemini" => Some(&mut self.gemini),
            "ollama" => Some(&mut self.ollama),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Local inference
// ─────────────────────────────────────────────

/// Settings for the llama.cpp client and the worker coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalConfig {
    /// Explicit `llama-cli` path; discovered on PATH when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    /// Model directory; `~/.translator/models` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models_dir: Option<String>,
    /// Maximum concurrent inference subprocesses.
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    /// Default context size when a model does not declare one.
    pub context_size: u32,
    /// GPU offload layers when a GPU backend is detected.
    pub gpu_layers: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    /// Extra `--key value` arguments for every invocation.
    pub additional_args: Vec<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub workers: Vec<ModelConfig>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            models_dir: None,
            max_concurrency: 2,
            request_timeout_secs: 300,
            context_size: 8192,
            gpu_layers: 99,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            additional_args: Vec::new(),
            source_lang: "en".to_string(),
            target_lang: "sr".to_string(),
            workers: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// OAuth
// ─────────────────────────────────────────────

/// Qwen OAuth locations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthConfig {
    /// Credentials file; `~/.translator/qwen_credentials.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,
    /// Token endpoint override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}
