//! LLM provider layer for Babel.
//!
//! # Architecture
//!
//! - [`registry`]: static specs for every provider + `create_client`
//! - [`http_provider::OpenAiCompatibleClient`]: generic `/chat/completions` client (OpenAI, ZhiPu)
//! - [`deepseek`], [`qwen`]: OpenAI-compatible vendors with their own rules
//! - [`anthropic`], [`gemini`], [`ollama`]: vendor-specific wire formats
//! - [`oauth::TokenManager`]: Qwen OAuth token storage and refresh

pub mod anthropic;
pub mod deepseek;
pub mod gemini;
pub mod http_provider;
pub mod oauth;
pub mod ollama;
pub mod qwen;
pub mod registry;

pub use http_provider::OpenAiCompatibleClient;
pub use oauth::{OAuthToken, TokenManager};
pub use registry::{create_client, find_by_name, ProviderSpec, PROVIDERS};
