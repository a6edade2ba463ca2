//! Multi-worker coordinator for local llama.cpp inference.
//!
//! Each configured [`ModelConfig`] becomes a worker slot. Workers are
//! admitted (RAM, model file, executable) once at construction; a task is
//! routed to the best available worker and run as a subprocess. At most
//! `max_concurrency` subprocesses run at the same time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use babel_core::client::LlmClient;
use babel_core::config::schema::LocalConfig;
use babel_core::error::LlmError;
use babel_core::types::ModelConfig;
use babel_core::utils::expand_home;

use crate::discovery::{is_executable, resolve_binary};
use crate::hardware::HardwareCapabilities;
use crate::llamacpp::{build_args, check_ram, InferenceSettings, DEFAULT_CONTEXT_SIZE};
use crate::process::{clean_output, run_inference};

const PROVIDER_NAME: &str = "llamacpp-multi";
const OUTPUT_MARKER: &str = "Translation:";

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ru", "Russian"),
    ("sr", "Serbian"),
    ("sr-cyrl", "Serbian Cyrillic"),
    ("sr-latn", "Serbian Latin"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
];

// ─────────────────────────────────────────────
// Prompt helpers
// ─────────────────────────────────────────────

/// Human-readable language name; unknown codes pass through unchanged.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// One unit of work for the coordinator.
#[derive(Clone, Debug, Default)]
pub struct TranslationTask {
    pub id: String,
    pub text: String,
    pub from_lang: String,
    pub to_lang: String,
    /// Pin the task to a specific worker.
    pub worker_id: Option<String>,
}

impl TranslationTask {
    pub fn new(text: impl Into<String>, from_lang: &str, to_lang: &str) -> Self {
        Self {
            id: format!("task_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            text: text.into(),
            from_lang: from_lang.to_string(),
            to_lang: to_lang.to_string(),
            worker_id: None,
        }
    }
}

/// The fixed instruction template sent to local models.
pub fn build_prompt(task: &TranslationTask) -> String {
    format!(
        "Translate the following text from {} to {}. \n\
         Provide ONLY the translation without any explanations, notes, or additional text.\n\
         Maintain the original formatting, line breaks, and structure.\n\
         \n\
         Source text:\n\
         {}\n\
         \n\
         {}",
        language_name(&task.from_lang),
        language_name(&task.to_lang),
        task.text,
        OUTPUT_MARKER
    )
}

/// Extract the translation from raw stdout: drop escape codes and prompt
/// echo, then anything up to the last output marker.
pub fn parse_output(raw: &str, prompt: &str) -> String {
    let cleaned = clean_output(raw, prompt);
    let body = match cleaned.rfind(OUTPUT_MARKER) {
        Some(idx) => &cleaned[idx + OUTPUT_MARKER.len()..],
        None => cleaned.as_str(),
    };
    body.trim().to_string()
}

/// Pull source/target languages out of a free-form prompt
/// ("from Russian to Serbian", "Russian to Serbian"), falling back to the
/// defaults.
fn infer_languages(prompt: &str, default_from: &str, default_to: &str) -> (String, String) {
    let lower = prompt.to_lowercase();
    let mut from = default_from.to_string();
    let mut to = default_to.to_string();
    // Longer names first so "serbian latin" wins over "serbian".
    let mut by_len: Vec<&(&str, &str)> = LANGUAGES.iter().collect();
    by_len.sort_by_key(|(_, name)| std::cmp::Reverse(name.len()));

    if let Some((code, _)) = by_len.iter().find(|(_, name)| {
        let name = name.to_lowercase();
        lower.contains(&format!("from {name}")) || lower.contains(&format!("{name} to "))
    }) {
        from = code.to_string();
    }
    if let Some((code, _)) = by_len
        .iter()
        .find(|(_, name)| lower.contains(&format!("to {}", name.to_lowercase())))
    {
        to = code.to_string();
    }
    (from, to)
}

// ─────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────

/// One model slot.
#[derive(Debug)]
pub struct Worker {
    config: ModelConfig,
    last_used: Mutex<Option<DateTime<Utc>>>,
}

impl Worker {
    fn new(config: ModelConfig) -> Self {
        Self {
            config,
            last_used: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used.lock().ok().and_then(|g| *g)
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_used.lock() {
            *guard = Some(Utc::now());
        }
    }

    /// Routing score: capability, content preference, quantization, idleness.
    fn score(&self, task: &TranslationTask) -> f64 {
        let mut score = 0.0;

        if self.config.has_capability("translation") {
            score += 20.0;
        }

        let looks_like_code = task.text.contains("code") || task.text.contains("```");
        if looks_like_code && self.config.is_preferred_for("code") {
            score += 15.0;
        } else if self.config.is_preferred_for("text") {
            score += 10.0;
        }

        score += match self.config.quantization.as_str() {
            "Q8_0" => 8.0,
            "Q5_K_M" => 6.0,
            "Q4_K_M" => 4.0,
            "Q4_0" => 2.0,
            _ => 0.0,
        };

        // Never-used workers get the full idle bonus.
        let idle_hours = self
            .last_used()
            .map(|t| (Utc::now() - t).num_seconds().max(0) as f64 / 3600.0)
            .unwrap_or(24.0);
        score += idle_hours.min(24.0) * 0.1;

        score
    }
}

// ─────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CoordinatorStats {
    pub total_workers: usize,
    pub available_workers: usize,
    pub max_concurrency: usize,
    pub completed: u64,
    pub failed: u64,
}

// ─────────────────────────────────────────────
// WorkerCoordinator
// ─────────────────────────────────────────────

pub struct WorkerCoordinator {
    config: LocalConfig,
    binary: Option<PathBuf>,
    hardware: HardwareCapabilities,
    workers: HashMap<String, Worker>,
    permits: Semaphore,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for WorkerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCoordinator")
            .field("binary", &self.binary)
            .field("workers", &self.workers.len())
            .field("max_concurrency", &self.config.max_concurrency)
            .finish()
    }
}

impl WorkerCoordinator {
    /// Build a coordinator for the current machine.
    pub fn new(config: LocalConfig) -> Self {
        Self::with_hardware(config, HardwareCapabilities::detect())
    }

    /// Build a coordinator against an explicit hardware snapshot.
    ///
    /// Models failing admission stay registered but are marked unavailable.
    pub fn with_hardware(config: LocalConfig, hardware: HardwareCapabilities) -> Self {
        let binary = match resolve_binary(config.binary_path.as_deref()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "No inference binary, all workers unavailable");
                None
            }
        };

        let mut workers = HashMap::new();
        for model in &config.workers {
            let mut model = model.clone();
            match admit_model(&model, binary.as_deref(), &hardware) {
                Ok(()) => {
                    model.is_available = true;
                    info!(worker = %model.id, model = %model.model_name, "Worker admitted");
                }
                Err(e) => {
                    model.is_available = false;
                    warn!(worker = %model.id, error = %e, "Worker rejected");
                }
            }
            workers.insert(model.id.clone(), Worker::new(model));
        }

        let permits = Semaphore::new(config.max_concurrency.max(1));

        Self {
            config,
            binary,
            hardware,
            workers,
            permits,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn hardware(&self) -> &HardwareCapabilities {
        &self.hardware
    }

    /// Descriptors of every registered worker, available or not.
    pub fn available_models(&self) -> Vec<ModelConfig> {
        self.workers.values().map(|w| w.config.clone()).collect()
    }

    pub fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.get(id)
    }

    /// Best available worker for `task`, honouring a pinned `worker_id`.
    pub fn select_worker(&self, task: &TranslationTask) -> Result<&Worker, LlmError> {
        if let Some(id) = &task.worker_id {
            return match self.workers.get(id) {
                Some(w) if w.config.is_available => Ok(w),
                Some(_) => Err(LlmError::config(format!("worker {id} is not available"))),
                None => Err(LlmError::config(format!("unknown worker: {id}"))),
            };
        }

        self.workers
            .values()
            .filter(|w| w.config.is_available)
            .map(|w| (w, w.score(task)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(w, _)| w)
            .ok_or_else(|| LlmError::config("no available workers"))
    }

    fn settings_for(&self, worker: &Worker) -> InferenceSettings {
        let mut settings = InferenceSettings::for_hardware(&self.hardware);
        settings.context_size = if worker.config.context_length > 0 {
            worker.config.context_length
        } else if self.config.context_size > 0 {
            self.config.context_size
        } else {
            DEFAULT_CONTEXT_SIZE
        };
        if worker.config.max_tokens > 0 {
            settings.max_tokens = worker.config.max_tokens;
        }
        settings.temperature = self.config.temperature;
        settings.top_p = self.config.top_p;
        settings.top_k = self.config.top_k;
        settings.repeat_penalty = self.config.repeat_penalty;
        settings.gpu_layers = self.config.gpu_layers;
        settings.extra_args = worker
            .config
            .model_params
            .iter()
            .map(|(k, v)| format!("--{k}={v}"))
            .chain(self.config.additional_args.iter().cloned())
            .collect();
        settings
    }

    /// Run one task on the best worker.
    pub async fn translate_task(&self, task: &TranslationTask) -> Result<String, LlmError> {
        if task.text.trim().is_empty() {
            return Ok(task.text.clone());
        }

        let worker = self.select_worker(task)?;
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| LlmError::ExecutableNotFound(crate::discovery::LLAMA_CLI.into()))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Cancelled("coordinator shut down".into()))?;

        let prompt = build_prompt(task);
        let args = build_args(
            &expand_home(&worker.config.path),
            &prompt,
            &self.settings_for(worker),
        );
        let timeout = Duration::from_secs(self.config.request_timeout_secs.max(1));

        debug!(task = %task.id, worker = %worker.id(), bytes = task.text.len(), "Dispatching task");
        worker.touch();

        match run_inference(binary, &args, timeout).await {
            Ok(raw) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(parse_output(&raw, &prompt))
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(task = %task.id, worker = %worker.id(), error = %e, "Task failed");
                Err(e)
            }
        }
    }

    /// Translate `text` between explicit languages.
    pub async fn translate_text(
        &self,
        text: &str,
        from_lang: &str,
        to_lang: &str,
    ) -> Result<String, LlmError> {
        self.translate_task(&TranslationTask::new(text, from_lang, to_lang))
            .await
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            total_workers: self.workers.len(),
            available_workers: self
                .workers
                .values()
                .filter(|w| w.config.is_available)
                .count(),
            max_concurrency: self.config.max_concurrency.max(1),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work. Tasks already running finish normally.
    pub fn shutdown(&self) {
        info!("Shutting down worker coordinator");
        self.permits.close();
    }
}

/// Admission check for one model slot.
pub fn admit_model(
    model: &ModelConfig,
    binary: Option<&Path>,
    hardware: &HardwareCapabilities,
) -> Result<(), LlmError> {
    check_ram(model.min_ram, hardware)?;

    let path = expand_home(&model.path);
    if !path.is_file() {
        return Err(LlmError::ModelFileNotFound(path));
    }

    match binary {
        Some(b) if is_executable(b) => Ok(()),
        Some(b) => Err(LlmError::ExecutableNotFound(b.display().to_string())),
        None => Err(LlmError::ExecutableNotFound(crate::discovery::LLAMA_CLI.into())),
    }
}

#[async_trait]
impl LlmClient for WorkerCoordinator {
    async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError> {
        let (from, to) = infer_languages(prompt, &self.config.source_lang, &self.config.target_lang);
        self.translate_text(text, &from, &to).await
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
