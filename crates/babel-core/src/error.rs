//! Error taxonomy shared by every provider client.
//!
//! Vendor failures are mapped into [`LlmError`] at the HTTP / subprocess
//! boundary. Callers branch on [`LlmError::kind`]; the `Display` text is kept
//! for diagnostics and still carries the vendor message.

use std::path::PathBuf;

use thiserror::Error;

/// Substrings that mark a vendor message as "input too large".
///
/// Matched case-insensitively.
const SIZE_ERROR_PATTERNS: &[&str] = &[
    "max_tokens",
    "token limit",
    "too large",
    "too long",
    "maximum length",
    "context length",
    "context size",
    "exceeds",
];

// ─────────────────────────────────────────────
// ErrorKind
// ─────────────────────────────────────────────

/// Closed classification of every failure a client can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing API key, bad model name, unknown provider.
    Configuration,
    /// Network failure or unreadable response body.
    Transport,
    /// Caller cancellation or deadline exceeded.
    Cancelled,
    /// Non-success status or a malformed / empty payload.
    Protocol,
    /// The vendor rejected the input as too large.
    SizeLimit,
    /// Insufficient RAM, missing model file, missing executable, subprocess failure.
    Resource,
    /// Token load, refresh or persistence failure.
    OAuth,
}

// ─────────────────────────────────────────────
// OAuthError
// ─────────────────────────────────────────────

/// Failures of the Qwen OAuth token lifecycle.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("QWEN_CLIENT_ID environment variable not set")]
    MissingClientId,

    #[error("QWEN_CLIENT_SECRET environment variable not set")]
    MissingClientSecret,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token refresh request failed: {0}")]
    Request(String),

    #[error("token refresh failed with status {status}: {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("failed to parse refresh response: {0}")]
    InvalidResponse(String),

    #[error("refresh response missing access token")]
    MissingAccessToken,

    #[error("failed to load token from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("failed to save refreshed token: {0}")]
    Persist(String),
}

// ─────────────────────────────────────────────
// LlmError
// ─────────────────────────────────────────────

/// Every error returned by an [`crate::client::LlmClient`].
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("{provider} API error (status {status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("insufficient RAM: model requires {required_gb:.1} GB, but only {available_gb:.1} GB available")]
    InsufficientRam { required_gb: f64, available_gb: f64 },

    #[error("model file not found: {}", .0.display())]
    ModelFileNotFound(PathBuf),

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("{message}")]
    Execution { message: String, stderr: String },

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("failed to translate chunk {index}/{total}: {source}")]
    Chunk {
        index: usize,
        total: usize,
        #[source]
        source: Box<LlmError>,
    },

    #[error("text too large to translate even after splitting ({bytes} bytes): {source}")]
    SplitExhausted {
        bytes: usize,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        LlmError::Configuration(message.into())
    }

    /// Shorthand for a malformed or empty vendor payload.
    pub fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Classify this error.
    ///
    /// Vendor payload errors whose text matches a size pattern are promoted
    /// to [`ErrorKind::SizeLimit`]; wrapped errors report the kind of their
    /// source.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Configuration(_) => ErrorKind::Configuration,
            LlmError::Transport { .. } => ErrorKind::Transport,
            LlmError::Timeout { .. } | LlmError::Cancelled(_) => ErrorKind::Cancelled,
            LlmError::Api { body, .. } => {
                if is_size_message(body) {
                    ErrorKind::SizeLimit
                } else {
                    ErrorKind::Protocol
                }
            }
            LlmError::InvalidResponse { message, .. } => {
                if is_size_message(message) {
                    ErrorKind::SizeLimit
                } else {
                    ErrorKind::Protocol
                }
            }
            LlmError::Execution { message, stderr } => {
                if is_size_message(stderr) || is_size_message(message) {
                    ErrorKind::SizeLimit
                } else {
                    ErrorKind::Resource
                }
            }
            LlmError::InsufficientRam { .. }
            | LlmError::ModelFileNotFound(_)
            | LlmError::ExecutableNotFound(_) => ErrorKind::Resource,
            LlmError::OAuth(_) => ErrorKind::OAuth,
            LlmError::Chunk { source, .. } | LlmError::SplitExhausted { source, .. } => {
                source.kind()
            }
        }
    }

    /// Whether the vendor rejected the input as too large.
    pub fn is_size_error(&self) -> bool {
        self.kind() == ErrorKind::SizeLimit
    }
}

/// Whether `err` is a size-class error. `None` is never one.
pub fn is_size_error(err: Option<&LlmError>) -> bool {
    err.is_some_and(LlmError::is_size_error)
}

/// Whether a raw vendor message describes an oversized input.
pub fn is_size_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    SIZE_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
