//! Shared data types passed between the registry, providers and the local
//! worker coordinator.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────
// TranslationConfig
// ─────────────────────────────────────────────

/// Per-client settings. Immutable once a client is built from it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslationConfig {
    /// Provider identifier (e.g. `"openai"`, `"qwen"`, `"llamacpp"`).
    pub provider: String,
    /// Model identifier. Empty means "provider default".
    pub model: String,
    /// API key. Empty means "look it up" (env var or OAuth).
    pub api_key: String,
    /// Base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Source language code (e.g. `"ru"`).
    pub source_lang: String,
    /// Target language code (e.g. `"sr"`).
    pub target_lang: String,
    /// Free-form provider options (`temperature`, `max_tokens`, `timeout_secs`, ...).
    pub options: HashMap<String, Value>,
}

impl TranslationConfig {
    /// Create a config for `provider` with everything else defaulted.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Numeric option lookup.
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(Value::as_f64)
    }

    /// Unsigned integer option lookup.
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    /// String option lookup.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Boolean option lookup.
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.option_f64("temperature")
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.option_u64("max_tokens").map(|n| n as u32)
    }

    /// Request timeout override (`timeout_secs`).
    pub fn timeout(&self) -> Option<Duration> {
        self.option_u64("timeout_secs").map(Duration::from_secs)
    }

    /// Model, or `default` when none is configured.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.model.is_empty() {
            default
        } else {
            &self.model
        }
    }
}

// ─────────────────────────────────────────────
// ModelConfig (local worker descriptor)
// ─────────────────────────────────────────────

/// One local model slot served by the worker coordinator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    /// Unique worker id.
    pub id: String,
    /// Path to the GGUF model file.
    pub path: String,
    /// Human-readable model name.
    pub model_name: String,
    /// Quantization label (e.g. `"Q4_K_M"`).
    pub quantization: String,
    /// Minimum RAM in bytes required to load the model.
    pub min_ram: u64,
    /// Context window in tokens. `0` means "use coordinator default".
    pub context_length: u32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Capability tags (e.g. `"translation"`).
    pub capabilities: Vec<String>,
    /// Content kinds this worker is preferred for (`"text"`, `"code"`).
    pub preferred_for: Vec<String>,
    /// Extra `--key value` arguments passed to the binary.
    pub model_params: BTreeMap<String, String>,
    pub is_default: bool,
    /// Set by admission; unavailable workers are never selected.
    pub is_available: bool,
}

impl ModelConfig {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn is_preferred_for(&self, kind: &str) -> bool {
        self.preferred_for.iter().any(|p| p == kind)
    }
}
