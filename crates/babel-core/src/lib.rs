//! Core building blocks for Babel.
//!
//! - [`client::LlmClient`]: the capability every translation backend implements
//! - [`error`]: closed error taxonomy ([`error::LlmError`], [`error::ErrorKind`])
//! - [`types`]: `TranslationConfig`, `ModelConfig`
//! - [`config`]: `~/.babel/config.json` schema, loader and env overrides

pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use client::LlmClient;
pub use error::{is_size_error, ErrorKind, LlmError, OAuthError};
pub use types::{ModelConfig, TranslationConfig};
