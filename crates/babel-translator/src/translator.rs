//! LLM-backed translator: prompt, size-aware retry, cache and stats.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;
use babel_providers::create_client;

use crate::prompt::{translation_prompt, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG};
use crate::retry::translate_with_retry;

/// Default number of cached translations kept per translator.
pub const MAX_CACHE_ENTRIES: usize = 10_000;

/// Running counters for one translator instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TranslationStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub cache_hits: u64,
}

/// Insertion-ordered cache; the oldest entry is evicted at capacity.
#[derive(Debug, Default)]
struct ResultCache {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ResultCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn get(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct LlmTranslator {
    config: TranslationConfig,
    client: Box<dyn LlmClient>,
    cache: Mutex<ResultCache>,
    stats: Mutex<TranslationStats>,
}

impl std::fmt::Debug for LlmTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTranslator")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .field("client", &self.client.provider_name())
            .finish()
    }
}

impl LlmTranslator {
    /// Build a translator for `config.provider` through the provider registry.
    pub fn new(config: TranslationConfig) -> Result<Self, LlmError> {
        let client = create_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Wrap an already constructed client.
    pub fn with_client(config: TranslationConfig, client: Box<dyn LlmClient>) -> Self {
        Self {
            config,
            client,
            cache: Mutex::new(ResultCache::with_capacity(MAX_CACHE_ENTRIES)),
            stats: Mutex::new(TranslationStats::default()),
        }
    }

    /// Cap the number of cached translations. Zero disables caching.
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ResultCache::with_capacity(capacity)),
            ..self
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn name(&self) -> String {
        format!("llm-{}", self.config.provider)
    }

    pub fn client(&self) -> &dyn LlmClient {
        self.client.as_ref()
    }

    pub fn stats(&self) -> TranslationStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn source_lang(&self) -> &str {
        non_empty(&self.config.source_lang).unwrap_or(DEFAULT_SOURCE_LANG)
    }

    fn target_lang(&self) -> &str {
        non_empty(&self.config.target_lang).unwrap_or(DEFAULT_TARGET_LANG)
    }

    /// Translate `text`. Blank input is returned unchanged without touching
    /// the provider; repeated `(text, context)` pairs are served from cache.
    pub async fn translate(&self, text: &str, context: &str) -> Result<String, LlmError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let key = format!("{text}:{context}");
        if let Some(hit) = self.cached(&key) {
            debug!(translator = %self.name(), "Cache hit");
            self.record(|s| s.cache_hits += 1);
            return Ok(hit);
        }

        let (from, to) = (self.source_lang(), self.target_lang());
        let build =
            |chunk: &str, chunk_context: &str| translation_prompt(chunk, chunk_context, from, to);

        match translate_with_retry(self.client.as_ref(), text, context, &build).await {
            Ok(raw) => {
                let result = enhance(text, &raw);
                self.record(|s| {
                    s.total += 1;
                    s.successful += 1;
                });
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, result.clone());
                }
                info!(
                    translator = %self.name(),
                    original_length = text.len(),
                    translated_length = result.len(),
                    "Translation completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.record(|s| {
                    s.total += 1;
                    s.failed += 1;
                });
                warn!(
                    translator = %self.name(),
                    bytes = text.len(),
                    error = %e,
                    "LLM translation failed"
                );
                Err(e)
            }
        }
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn record(&self, update: impl FnOnce(&mut TranslationStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Post-process a model answer against its source text.
///
/// Curly double quotes and the left single quote become ASCII, a trailing
/// newline on the source is kept, and a lowercase first letter is
/// capitalised when the source started with an uppercase one.
pub fn enhance(original: &str, translated: &str) -> String {
    let mut out = translated
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2018}', "'");

    if original.ends_with('\n') && !out.ends_with('\n') {
        out.push('\n');
    }

    let source_upper = original.chars().next().is_some_and(char::is_uppercase);
    let first = out.chars().next();
    match first {
        Some(first) if source_upper && first.is_lowercase() => {
            let rest = &out[first.len_utf8()..];
            first.to_uppercase().chain(rest.chars()).collect()
        }
        _ => out,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
