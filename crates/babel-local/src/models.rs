//! GGUF model catalogue and on-disk model store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use babel_core::error::LlmError;

const GB: u64 = 1024 * 1024 * 1024;

/// Files smaller than this are treated as truncated downloads.
const MIN_VALID_MODEL_BYTES: u64 = 1024 * 1024;

// ─────────────────────────────────────────────
// ModelInfo
// ─────────────────────────────────────────────

/// Static metadata about one downloadable model.
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Parameter count (e.g. `7_000_000_000`).
    pub parameters: u64,
    /// Minimum RAM in bytes for the listed quantization.
    pub min_ram: u64,
    pub recommended_ram: u64,
    pub quant_type: &'static str,
    pub source_url: &'static str,
    pub languages: &'static [&'static str],
    pub optimized_for: &'static str,
    /// `excellent`, `good` or `moderate`.
    pub quality: &'static str,
    pub requires_gpu: bool,
    /// Context window in tokens.
    pub context_length: u32,
}

impl ModelInfo {
    pub fn supports_language(&self, lang: &str) -> bool {
        self.languages.contains(&lang)
    }

    fn is_translation_focused(&self) -> bool {
        self.optimized_for.to_lowercase().contains("translation")
    }
}

/// All models the local client knows how to fetch and run.
pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "qwen2.5-7b-instruct-q4",
        name: "Qwen 2.5 7B Instruct (Q4)",
        parameters: 7_000_000_000,
        min_ram: 6 * GB,
        recommended_ram: 8 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/bartowski/Qwen2.5-7B-Instruct-GGUF/resolve/main/Qwen2.5-7B-Instruct-Q4_K_M.gguf",
        languages: &["en", "ru", "sr", "zh", "ja", "ko", "de", "es", "fr"],
        optimized_for: "General + Translation",
        quality: "excellent",
        requires_gpu: false,
        context_length: 32768,
    },
    ModelInfo {
        id: "mistral-7b-instruct-q4",
        name: "Mistral 7B Instruct v0.3 (Q4)",
        parameters: 7_000_000_000,
        min_ram: 6 * GB,
        recommended_ram: 8 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/mistralai/Mistral-7B-Instruct-v0.3-GGUF",
        languages: &["en", "ru", "de", "es", "fr", "it"],
        optimized_for: "General + Translation",
        quality: "good",
        requires_gpu: false,
        context_length: 8192,
    },
    ModelInfo {
        id: "qwen2.5-14b-instruct-q4",
        name: "Qwen 2.5 14B Instruct (Q4)",
        parameters: 14_000_000_000,
        min_ram: 12 * GB,
        recommended_ram: 16 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/Qwen/Qwen2.5-14B-Instruct-GGUF",
        languages: &["en", "ru", "sr", "zh", "ja", "ko", "de", "es", "fr"],
        optimized_for: "High-Quality Translation",
        quality: "excellent",
        requires_gpu: false,
        context_length: 32768,
    },
    ModelInfo {
        id: "qwen2.5-27b-instruct-q4",
        name: "Qwen 2.5 27B Instruct (Q4)",
        parameters: 27_000_000_000,
        min_ram: 24 * GB,
        recommended_ram: 32 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/Qwen/Qwen2.5-27B-Instruct-GGUF",
        languages: &["en", "ru", "sr", "zh", "ja", "ko", "de", "es", "fr"],
        optimized_for: "Professional Translation",
        quality: "excellent",
        requires_gpu: false,
        context_length: 32768,
    },
    ModelInfo {
        id: "phi-3-mini-4k-q4",
        name: "Phi-3 Mini 3.8B (Q4)",
        parameters: 3_800_000_000,
        min_ram: 4 * GB,
        recommended_ram: 6 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/microsoft/Phi-3-mini-4k-instruct-gguf",
        languages: &["en", "ru", "de", "es", "fr"],
        optimized_for: "Low-Resource Translation",
        quality: "moderate",
        requires_gpu: false,
        context_length: 4096,
    },
    ModelInfo {
        id: "gemma-2-9b-it-q4",
        name: "Gemma 2 9B Instruct (Q4)",
        parameters: 9_000_000_000,
        min_ram: 8 * GB,
        recommended_ram: 12 * GB,
        quant_type: "Q4_K_M",
        source_url: "https://huggingface.co/google/gemma-2-9b-it-GGUF",
        languages: &["en", "ru", "de", "es", "fr", "it", "pt", "zh", "ja", "ko"],
        optimized_for: "Balanced Translation",
        quality: "good",
        requires_gpu: false,
        context_length: 8192,
    },
];

// ─────────────────────────────────────────────
// Lookup & selection
// ─────────────────────────────────────────────

pub fn find_by_id(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}

/// Models whose minimum RAM fits in `max_ram` bytes.
pub fn filter_by_ram(max_ram: u64) -> Vec<&'static ModelInfo> {
    MODELS.iter().filter(|m| m.min_ram <= max_ram).collect()
}

/// Models supporting every language in `languages`.
pub fn filter_by_languages(languages: &[&str]) -> Vec<&'static ModelInfo> {
    MODELS
        .iter()
        .filter(|m| languages.iter().all(|l| m.supports_language(l)))
        .collect()
}

/// Pick the highest-scoring model that fits `max_ram` and the GPU situation.
pub fn find_best_model(
    max_ram: u64,
    preferred_langs: &[&str],
    has_gpu: bool,
) -> Result<&'static ModelInfo, LlmError> {
    let mut best: Option<(&'static ModelInfo, f64)> = None;

    for model in MODELS
        .iter()
        .filter(|m| m.min_ram <= max_ram && (!m.requires_gpu || has_gpu))
    {
        let score = score_model(model, preferred_langs, max_ram);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((model, score));
        }
    }

    best.map(|(m, _)| m).ok_or_else(|| {
        LlmError::config(format!(
            "no models found within RAM constraint of {} GB",
            max_ram / GB
        ))
    })
}

/// Translation-focused models first, topped up with general ones to three.
pub fn recommendations_for_hardware(ram_gb: f64) -> Vec<&'static ModelInfo> {
    let candidates = filter_by_ram((ram_gb * GB as f64) as u64);
    let mut recs: Vec<&'static ModelInfo> = candidates
        .iter()
        .copied()
        .filter(|m| m.is_translation_focused())
        .collect();

    if recs.len() < 3 {
        for model in candidates {
            if !recs.iter().any(|r| r.id == model.id) {
                recs.push(model);
            }
        }
    }
    recs
}

fn score_model(model: &ModelInfo, preferred_langs: &[&str], max_ram: u64) -> f64 {
    let mut score = match model.quality {
        "excellent" => 10.0,
        "good" => 7.0,
        "moderate" => 4.0,
        _ => 0.0,
    };

    let focus = model.optimized_for.to_lowercase();
    if focus.contains("professional translation") || focus.contains("multilingual translation") {
        score += 8.0;
    } else if focus.contains("translation") {
        score += 4.0;
    }

    let lang_hits = preferred_langs
        .iter()
        .filter(|l| model.supports_language(l))
        .count();
    score += lang_hits as f64 * 2.0;

    let ram_usage = model.recommended_ram as f64 / max_ram.max(1) as f64;
    if ram_usage <= 0.6 {
        score += 3.0;
    } else if ram_usage <= 0.8 {
        score += 1.0;
    }

    let billions = model.parameters as f64 / 1_000_000_000.0;
    if (7.0..=14.0).contains(&billions) {
        score += 2.0;
    } else if billions > 14.0 {
        score += 1.0;
    }

    if model.context_length >= 8192 {
        score += 1.0;
    }

    score
}

// ─────────────────────────────────────────────
// ModelStore
// ─────────────────────────────────────────────

/// Directory of downloaded `<id>.gguf` files.
#[derive(Clone, Debug)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, model: &ModelInfo) -> PathBuf {
        self.dir.join(format!("{}.gguf", model.id))
    }

    /// Path of an already-downloaded model; truncated files are discarded.
    pub fn locate(&self, model: &ModelInfo) -> Option<PathBuf> {
        let path = self.path_for(model);
        let meta = std::fs::metadata(&path).ok()?;
        if meta.len() >= MIN_VALID_MODEL_BYTES {
            return Some(path);
        }
        warn!(path = %path.display(), bytes = meta.len(), "Discarding truncated model file");
        let _ = std::fs::remove_file(&path);
        None
    }

    /// IDs of every `.gguf` file in the store.
    pub fn list_downloaded(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix(".gguf").map(String::from)
            })
            .collect();
        ids.sort();
        ids
    }

    /// Return the local path of `model`, downloading it first when missing.
    pub async fn ensure(&self, model: &ModelInfo) -> Result<PathBuf, LlmError> {
        if let Some(path) = self.locate(model) {
            return Ok(path);
        }
        self.download_from(model, model.source_url).await
    }

    /// Stream `url` into `<id>.gguf.tmp`, then rename into place.
    pub async fn download_from(&self, model: &ModelInfo, url: &str) -> Result<PathBuf, LlmError> {
        let io_err = |e: std::io::Error| LlmError::Execution {
            message: format!("model download failed: {e}"),
            stderr: String::new(),
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let dest = self.path_for(model);
        let tmp = dest.with_extension("gguf.tmp");

        info!(model = model.id, url = url, "Downloading model");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .map_err(|e| LlmError::Transport {
                provider: "model-store".into(),
                message: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| LlmError::Transport {
            provider: "model-store".into(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: "model-store".into(),
                status: status.as_u16(),
                body,
            });
        }

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(LlmError::Transport {
                        provider: "model-store".into(),
                        message: e.to_string(),
                    });
                }
            };
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        drop(file);

        if written < MIN_VALID_MODEL_BYTES {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LlmError::Execution {
                message: format!("downloaded file too small: {written} bytes"),
                stderr: String::new(),
            });
        }

        tokio::fs::rename(&tmp, &dest).await.map_err(io_err)?;
        debug!(path = %dest.display(), bytes = written, "Model ready");
        Ok(dest)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_find_by_id() {
        let m = find_by_id("qwen2.5-7b-instruct-q4").unwrap();
        assert_eq!(m.context_length, 32768);
        assert!(m.supports_language("sr"));
        assert!(find_by_id("nope").is_none());
    }

    #[test]
    fn test_filter_by_ram() {
        let small = filter_by_ram(5 * GB);
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].id, "phi-3-mini-4k-q4");
        assert_eq!(filter_by_ram(64 * GB).len(), MODELS.len());
    }

    #[test]
    fn test_filter_by_languages() {
        let serbian = filter_by_languages(&["ru", "sr"]);
        assert!(serbian.iter().all(|m| m.id.starts_with("qwen")));
        assert_eq!(serbian.len(), 3);
    }

    #[test]
    fn test_find_best_model_prefers_serbian_support() {
        let best = find_best_model(16 * GB, &["ru", "sr"], false).unwrap();
        assert!(best.supports_language("sr"));
    }

    #[test]
    fn test_find_best_model_low_ram() {
        let best = find_best_model(4 * GB, &["en"], false).unwrap();
        assert_eq!(best.id, "phi-3-mini-4k-q4");
        assert!(find_best_model(GB, &["en"], false).is_err());
    }

    #[test]
    fn test_recommendations_for_hardware() {
        let recs = recommendations_for_hardware(8.0);
        assert!(recs.len() >= 3);
        assert!(recs.iter().all(|m| m.min_ram <= 8 * GB));
    }

    #[test]
    fn test_store_locate_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = find_by_id("phi-3-mini-4k-q4").unwrap();
        assert!(store.locate(model).is_none());

        std::fs::write(store.path_for(model), vec![0u8; 16]).unwrap();
        // Truncated files are discarded.
        assert!(store.locate(model).is_none());
        assert!(!store.path_for(model).exists());

        std::fs::write(store.path_for(model), vec![0u8; MIN_VALID_MODEL_BYTES as usize]).unwrap();
        assert_eq!(store.locate(model), Some(store.path_for(model)));
        assert_eq!(store.list_downloaded(), vec!["phi-3-mini-4k-q4".to_string()]);
    }

    #[tokio::test]
    async fn test_download_from_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/phi.gguf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(vec![7u8; MIN_VALID_MODEL_BYTES as usize]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        let model = find_by_id("phi-3-mini-4k-q4").unwrap();
        let path = store
            .download_from(model, &format!("{}/phi.gguf", server.uri()))
            .await
            .unwrap();
        assert_eq!(path, store.path_for(model));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MIN_VALID_MODEL_BYTES);
    }

    #[tokio::test]
    async fn test_download_rejects_tiny_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not a model</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = find_by_id("phi-3-mini-4k-q4").unwrap();
        let err = store.download_from(model, &server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("too small"));
        assert!(!store.path_for(model).exists());
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = find_by_id("phi-3-mini-4k-q4").unwrap();
        let err = store.download_from(model, &server.uri()).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 404, .. }));
    }
}
