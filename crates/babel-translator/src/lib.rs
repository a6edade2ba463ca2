//! Babel Translator: text splitting, size-aware retry and the LLM translator.
//!
//! This crate contains:
//! - **splitter**: Lossless paragraph/sentence chunking
//! - **retry**: Retry-on-size-error orchestration over any `LlmClient`
//! - **prompt**: Literary translation prompt
//! - **translator**: `LlmTranslator` with caching, stats and post-processing

pub mod prompt;
pub mod retry;
pub mod splitter;
pub mod translator;

pub use retry::{translate_with_retry, PromptBuilder};
pub use splitter::{split_by_sentences, split_text, split_text_with_limit, MAX_CHUNK_SIZE};
pub use translator::{LlmTranslator, TranslationStats, MAX_CACHE_ENTRIES};
