//! The capability every translation backend implements.
//!
//! HTTP vendors, the single-binary llama.cpp client and the multi-worker
//! coordinator all sit behind this trait so callers can hold an
//! `Arc<dyn LlmClient>` without knowing which one they got.

use async_trait::async_trait;

use crate::error::LlmError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Translate `text`, instructing the model with `prompt`.
    ///
    /// Dropping the returned future cancels the in-flight request (or kills
    /// the inference subprocess).
    async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError>;

    /// Stable provider identifier (e.g. `"openai"`).
    fn provider_name(&self) -> &str;
}
