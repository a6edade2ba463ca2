//! Single-binary llama.cpp provider.
//!
//! Shells out to `llama-cli` once per request with hardware-tuned arguments.
//! The model is resolved from the catalogue (or an explicit `model_path`
//! option) and downloaded into the model store on first use when allowed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use babel_core::client::LlmClient;
use babel_core::error::LlmError;
use babel_core::types::TranslationConfig;
use babel_core::utils::{expand_home, get_models_path};

use crate::discovery::{is_executable, resolve_binary};
use crate::hardware::{GpuBackend, HardwareCapabilities};
use crate::models::{self, ModelInfo, ModelStore};
use crate::process::{clean_output, run_inference};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub const DEFAULT_CONTEXT_SIZE: u32 = 8192;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────
// Inference settings & argument building
// ─────────────────────────────────────────────

/// Sampling and runtime knobs passed to `llama-cli`.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceSettings {
    pub threads: usize,
    pub context_size: u32,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub gpu: GpuBackend,
    pub gpu_layers: u32,
    /// Appended verbatim.
    pub extra_args: Vec<String>,
}

impl InferenceSettings {
    /// Defaults tuned for translation on the given hardware.
    pub fn for_hardware(hardware: &HardwareCapabilities) -> Self {
        Self {
            threads: hardware.optimal_threads(),
            context_size: DEFAULT_CONTEXT_SIZE,
            max_tokens: 4096,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            gpu: hardware.gpu,
            gpu_layers: 99,
            extra_args: Vec::new(),
        }
    }
}

/// Command line for one inference run.
pub fn build_args(model_path: &Path, prompt: &str, settings: &InferenceSettings) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        model_path.display().to_string(),
        "-p".to_string(),
        prompt.to_string(),
        "-n".to_string(),
        settings.max_tokens.to_string(),
        "-t".to_string(),
        settings.threads.max(1).to_string(),
        "-c".to_string(),
        settings.context_size.to_string(),
        "--temp".to_string(),
        settings.temperature.to_string(),
        "--top-p".to_string(),
        settings.top_p.to_string(),
        "--top-k".to_string(),
        settings.top_k.to_string(),
        "--repeat-penalty".to_string(),
        settings.repeat_penalty.to_string(),
        "--no-display-prompt".to_string(),
    ];

    if settings.gpu.is_accelerated() && settings.gpu_layers > 0 {
        args.push("-ngl".to_string());
        args.push(settings.gpu_layers.to_string());
    }

    args.extend(settings.extra_args.iter().cloned());
    args
}

/// Post-process raw stdout. Blank input is returned untouched by callers
/// before inference, so trimming here is always safe.
pub(crate) fn finish_output(raw: &str, prompt: &str) -> String {
    clean_output(raw, prompt).trim().to_string()
}

/// Fail when the host cannot hold the model in memory.
pub fn check_ram(required: u64, hardware: &HardwareCapabilities) -> Result<(), LlmError> {
    if required > hardware.available_ram {
        return Err(LlmError::InsufficientRam {
            required_gb: required as f64 / GB,
            available_gb: hardware.available_ram as f64 / GB,
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────
// LlamaCppClient
// ─────────────────────────────────────────────

enum ModelSource {
    File(PathBuf),
    Store { store: ModelStore, auto_download: bool },
}

pub struct LlamaCppClient {
    binary: PathBuf,
    model: Option<&'static ModelInfo>,
    source: ModelSource,
    model_path: OnceCell<PathBuf>,
    hardware: HardwareCapabilities,
    settings: InferenceSettings,
    timeout: Duration,
}

impl std::fmt::Debug for LlamaCppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaCppClient")
            .field("binary", &self.binary)
            .field("model", &self.model.map(|m| m.id))
            .field("threads", &self.settings.threads)
            .field("gpu", &self.settings.gpu)
            .finish()
    }
}

impl LlamaCppClient {
    /// Build from config, probing the local machine.
    ///
    /// Options: `binary_path`, `model_path`, `models_dir`, `auto_download`,
    /// `context_size`, `gpu_layers`, `temperature`, `max_tokens`, `timeout_secs`.
    pub fn new(config: &TranslationConfig) -> Result<Self, LlmError> {
        Self::with_hardware(config, HardwareCapabilities::detect())
    }

    /// Build from config with an explicit hardware snapshot.
    pub fn with_hardware(
        config: &TranslationConfig,
        hardware: HardwareCapabilities,
    ) -> Result<Self, LlmError> {
        let binary = resolve_binary(config.option_str("binary_path"))?;

        let model = if config.model.is_empty() {
            if config.option_str("model_path").is_some() {
                None
            } else {
                let langs: Vec<&str> = [config.source_lang.as_str(), config.target_lang.as_str()]
                    .into_iter()
                    .filter(|l| !l.is_empty())
                    .collect();
                // Leave headroom for the OS and the rest of the app.
                let budget = hardware.total_ram / 10 * 6;
                Some(models::find_best_model(budget, &langs, hardware.has_gpu())?)
            }
        } else {
            Some(models::find_by_id(&config.model).ok_or_else(|| {
                LlmError::config(format!("unknown local model: {}", config.model))
            })?)
        };

        if let Some(info) = model {
            if !hardware.can_run_model(info.parameters) {
                warn!(
                    model = info.id,
                    max_params = hardware.max_model_size,
                    "Model is larger than this machine comfortably supports"
                );
            }
            check_ram(info.min_ram, &hardware)?;
        }

        let source = match config.option_str("model_path") {
            Some(path) => {
                let path = expand_home(path);
                if !path.is_file() {
                    return Err(LlmError::ModelFileNotFound(path));
                }
                ModelSource::File(path)
            }
            None => ModelSource::Store {
                store: ModelStore::new(
                    config
                        .option_str("models_dir")
                        .map(expand_home)
                        .unwrap_or_else(get_models_path),
                ),
                auto_download: config.option_bool("auto_download").unwrap_or(true),
            },
        };

        let mut settings = InferenceSettings::for_hardware(&hardware);
        settings.context_size = config
            .option_u64("context_size")
            .map(|n| n as u32)
            .or_else(|| model.map(|m| m.context_length))
            .unwrap_or(DEFAULT_CONTEXT_SIZE);
        if let Some(layers) = config.option_u64("gpu_layers") {
            settings.gpu_layers = layers as u32;
        }
        if let Some(t) = config.temperature() {
            settings.temperature = t;
        }
        if let Some(n) = config.max_tokens() {
            settings.max_tokens = n;
        }

        info!(
            binary = %binary.display(),
            model = model.map(|m| m.id).unwrap_or("custom"),
            threads = settings.threads,
            context = settings.context_size,
            gpu = %settings.gpu,
            "Created llama.cpp client"
        );

        Ok(Self {
            binary,
            model,
            source,
            model_path: OnceCell::new(),
            hardware,
            settings,
            timeout: config.timeout().unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn model_info(&self) -> Option<&'static ModelInfo> {
        self.model
    }

    pub fn hardware(&self) -> &HardwareCapabilities {
        &self.hardware
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Re-check executable, model file and RAM.
    pub fn validate(&self) -> Result<(), LlmError> {
        if !is_executable(&self.binary) {
            return Err(LlmError::ExecutableNotFound(self.binary.display().to_string()));
        }
        match &self.source {
            ModelSource::File(path) if !path.is_file() => {
                return Err(LlmError::ModelFileNotFound(path.clone()));
            }
            ModelSource::Store { store, .. } => {
                if let Some(info) = self.model {
                    if store.locate(info).is_none() {
                        return Err(LlmError::ModelFileNotFound(store.path_for(info)));
                    }
                }
            }
            _ => {}
        }
        if let Some(info) = self.model {
            check_ram(info.min_ram, &self.hardware)?;
        }
        Ok(())
    }

    async fn resolve_model_path(&self) -> Result<&PathBuf, LlmError> {
        self.model_path
            .get_or_try_init(|| async {
                match &self.source {
                    ModelSource::File(path) => Ok::<_, LlmError>(path.clone()),
                    ModelSource::Store {
                        store,
                        auto_download,
                    } => {
                        let info = self
                            .model
                            .ok_or_else(|| LlmError::config("no local model selected"))?;
                        match store.locate(info) {
                            Some(path) => Ok(path),
                            None if *auto_download => store.ensure(info).await,
                            None => Err(LlmError::ModelFileNotFound(store.path_for(info))),
                        }
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl LlmClient for LlamaCppClient {
    async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let model_path = self.resolve_model_path().await?;
        let args = build_args(model_path, prompt, &self.settings);

        debug!(bytes = text.len(), threads = self.settings.threads, "Starting local inference");
        let started = std::time::Instant::now();
        let raw = run_inference(&self.binary, &args, self.timeout).await?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_bytes = raw.len(),
            "Local inference complete"
        );

        Ok(finish_output(&raw, prompt))
    }

    fn provider_name(&self) -> &str {
        "llamacpp"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::error::ErrorKind;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn hardware(available_gb: u64, gpu: GpuBackend) -> HardwareCapabilities {
        HardwareCapabilities {
            architecture: "x86_64".into(),
            total_ram: 64 * GIB,
            available_ram: available_gb * GIB,
            cpu_model: "Test CPU".into(),
            cpu_cores: 8,
            gpu,
            max_model_size: 27_000_000_000,
        }
    }

    #[test]
    fn test_build_args_cpu() {
        let settings = InferenceSettings::for_hardware(&hardware(16, GpuBackend::None));
        let args = build_args(Path::new("/m/q.gguf"), "PROMPT", &settings);
        let joined = args.join(" ");
        assert!(joined.starts_with("-m /m/q.gguf -p PROMPT"));
        assert!(joined.contains("-t 6"));
        assert!(joined.contains("-c 8192"));
        assert!(joined.contains("--no-display-prompt"));
        assert!(!args.contains(&"-ngl".to_string()));
    }

    #[test]
    fn test_build_args_gpu_backends() {
        for gpu in [GpuBackend::Metal, GpuBackend::Cuda, GpuBackend::Rocm] {
            let settings = InferenceSettings::for_hardware(&hardware(16, gpu));
            let args = build_args(Path::new("/m/q.gguf"), "P", &settings);
            let idx = args.iter().position(|a| a == "-ngl").unwrap();
            assert_eq!(args[idx + 1], "99");
        }
    }

    #[test]
    fn test_check_ram() {
        let hw = hardware(8, GpuBackend::None);
        assert!(check_ram(6 * GIB, &hw).is_ok());
        let err = check_ram(16 * GIB, &hw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(
            err.to_string(),
            "insufficient RAM: model requires 16.0 GB, but only 8.0 GB available"
        );
    }

    #[test]
    fn test_finish_output() {
        assert_eq!(finish_output("  Zdravo svete \n", "P"), "Zdravo svete");
        assert_eq!(finish_output("P\nZdravo", "P"), "Zdravo");
    }

    #[test]
    fn test_unknown_model_rejected() {
        let cfg = TranslationConfig::new("llamacpp")
            .with_model("gpt-4")
            .with_option("binary_path", "/bin/sh");
        let err = LlamaCppClient::with_hardware(&cfg, hardware(32, GpuBackend::None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_llama(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("llama-cli");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn client(dir: &Path, body: &str, available_gb: u64) -> Result<LlamaCppClient, LlmError> {
            let bin = fake_llama(dir, body);
            let model = dir.join("model.gguf");
            std::fs::write(&model, b"gguf").unwrap();
            let cfg = TranslationConfig::new("llamacpp")
                .with_model("qwen2.5-7b-instruct-q4")
                .with_option("binary_path", bin.to_string_lossy().to_string())
                .with_option("model_path", model.to_string_lossy().to_string());
            LlamaCppClient::with_hardware(&cfg, hardware(available_gb, GpuBackend::None))
        }

        #[tokio::test]
        async fn test_translate_runs_binary() {
            let dir = tempfile::tempdir().unwrap();
            let c = client(dir.path(), "echo '  Zdravo svete  '", 16).unwrap();
            assert_eq!(c.settings().context_size, 32768);
            assert!(c.validate().is_ok());
            assert_eq!(c.translate("Hello world", "Translate").await.unwrap(), "Zdravo svete");
            assert_eq!(c.provider_name(), "llamacpp");
        }

        #[tokio::test]
        async fn test_blank_input_passes_through() {
            let dir = tempfile::tempdir().unwrap();
            let c = client(dir.path(), "exit 1", 16).unwrap();
            assert_eq!(c.translate("  \n ", "Translate").await.unwrap(), "  \n ");
        }

        #[tokio::test]
        async fn test_failure_embeds_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let c = client(dir.path(), "echo 'ggml: out of memory' >&2; exit 1", 16).unwrap();
            let err = c.translate("Hello", "Translate").await.unwrap_err();
            assert!(err.to_string().contains("out of memory"));
        }

        #[test]
        fn test_insufficient_ram() {
            let dir = tempfile::tempdir().unwrap();
            let err = client(dir.path(), "true", 2).unwrap_err();
            assert!(err.to_string().contains("insufficient RAM"));
        }

        #[test]
        fn test_missing_model_file() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_llama(dir.path(), "true");
            let cfg = TranslationConfig::new("llamacpp")
                .with_option("binary_path", bin.to_string_lossy().to_string())
                .with_option("model_path", "/nope/model.gguf");
            let err = LlamaCppClient::with_hardware(&cfg, hardware(16, GpuBackend::None)).unwrap_err();
            assert!(err.to_string().contains("model file not found"));
        }

        #[tokio::test]
        async fn test_store_without_download_reports_missing_file() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_llama(dir.path(), "echo ok");
            let cfg = TranslationConfig::new("llamacpp")
                .with_model("phi-3-mini-4k-q4")
                .with_option("binary_path", bin.to_string_lossy().to_string())
                .with_option("models_dir", dir.path().join("models").to_string_lossy().to_string())
                .with_option("auto_download", false);
            let c = LlamaCppClient::with_hardware(&cfg, hardware(16, GpuBackend::None)).unwrap();
            assert!(c.validate().is_err());
            let err = c.translate("Hello", "Translate").await.unwrap_err();
            assert!(matches!(err, LlmError::ModelFileNotFound(_)));
        }
    }
}
