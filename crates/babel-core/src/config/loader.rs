//! Config loader: reads `~/.babel/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.babel/config.json`
//! 3. Environment variables `BABEL_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

const PROVIDER_NAMES: &[&str] = &[
    "openai",
    "anthropic",
    "deepseek",
    "zhipu",
    "qwen",
    "gemini",
    "ollama",
];

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `BABEL_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `BABEL_TRANSLATION__PROVIDER` / `__MODEL` / `__SOURCE_LANG` / `__TARGET_LANG`
/// - `BABEL_TRANSLATION__TEMPERATURE` / `__MAX_TOKENS` / `__TIMEOUT_SECS`
/// - `BABEL_PROVIDERS__<NAME>__API_KEY` / `__API_BASE`
/// - `BABEL_LOCAL__BINARY_PATH` / `__MODELS_DIR` / `__MAX_CONCURRENCY`
/// - `BABEL_OAUTH__CREDENTIALS_PATH` / `__TOKEN_URL`
fn apply_env_overrides(mut config: Config) -> Config {
    let t = &mut config.translation;
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__PROVIDER") {
        t.provider = val;
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__MODEL") {
        t.model = val;
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__SOURCE_LANG") {
        t.source_lang = val;
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__TARGET_LANG") {
        t.target_lang = val;
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__TEMPERATURE") {
        if let Ok(v) = val.parse::<f64>() {
            t.temperature = v;
        }
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            t.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("BABEL_TRANSLATION__TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            t.timeout_secs = Some(n);
        }
    }

    for name in PROVIDER_NAMES {
        if let Some(provider) = config.providers.get_mut_by_name(name) {
            let upper = name.to_uppercase();
            if let Ok(val) = std::env::var(format!("BABEL_PROVIDERS__{upper}__API_KEY")) {
                provider.api_key = val;
            }
            if let Ok(val) = std::env::var(format!("BABEL_PROVIDERS__{upper}__API_BASE")) {
                provider.api_base = Some(val);
            }
        }
    }

    if let Ok(val) = std::env::var("BABEL_LOCAL__BINARY_PATH") {
        config.local.binary_path = Some(val);
    }
    if let Ok(val) = std::env::var("BABEL_LOCAL__MODELS_DIR") {
        config.local.models_dir = Some(val);
    }
    if let Ok(val) = std::env::var("BABEL_LOCAL__MAX_CONCURRENCY") {
        if let Ok(n) = val.parse::<usize>() {
            config.local.max_concurrency = n;
        }
    }

    if let Ok(val) = std::env::var("BABEL_OAUTH__CREDENTIALS_PATH") {
        config.oauth.credentials_path = Some(val);
    }
    if let Ok(val) = std::env::var("BABEL_OAUTH__TOKEN_URL") {
        config.oauth.token_url = Some(val);
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
