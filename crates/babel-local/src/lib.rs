//! Local inference for Babel.
//!
//! - [`hardware`]: RAM / CPU / GPU detection and model-size limits
//! - [`models`]: GGUF model catalogue and the on-disk model store
//! - [`llamacpp::LlamaCppClient`]: one model, one `llama-cli` per request
//! - [`coordinator::WorkerCoordinator`]: several model slots behind a concurrency limit

pub mod coordinator;
pub mod discovery;
pub mod hardware;
pub mod llamacpp;
pub mod models;
pub mod process;

pub use coordinator::{CoordinatorStats, TranslationTask, WorkerCoordinator};
pub use hardware::{GpuBackend, HardwareCapabilities};
pub use llamacpp::LlamaCppClient;
pub use models::{ModelInfo, ModelStore, MODELS};
