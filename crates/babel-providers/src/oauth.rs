//! OAuth token lifecycle for Qwen.
//!
//! The token lives on disk as JSON (`access_token`, `token_type`,
//! `refresh_token`, `resource_url`, `expiry_date` in epoch millis). The
//! in-memory copy sits behind a `tokio::sync::Mutex` held across refresh, so
//! concurrent callers never refresh twice for the same expiry.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use babel_core::error::{LlmError, OAuthError};
use babel_core::utils::{get_translator_path, home_dir};

use crate::http_provider::{build_http_client, DEFAULT_TIMEOUT};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth.aliyun.com/v1/token";

const CLIENT_ID_VAR: &str = "QWEN_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "QWEN_CLIENT_SECRET";

// ─────────────────────────────────────────────
// OAuthToken
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub resource_url: String,
    /// Expiry instant, milliseconds since the Unix epoch.
    pub expiry_date: i64,
}

impl OAuthToken {
    /// No grace window: expired strictly after `expiry_date`.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expiry_date
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
}

// ─────────────────────────────────────────────
// Credential files
// ─────────────────────────────────────────────

/// `~/.translator/qwen_credentials.json`
pub fn default_credentials_path() -> PathBuf {
    get_translator_path().join("qwen_credentials.json")
}

/// `~/.qwen/oauth_creds.json`, written by the Qwen Code CLI.
pub fn fallback_credentials_path() -> PathBuf {
    home_dir().join(".qwen").join("oauth_creds.json")
}

pub fn read_token_file(path: &Path) -> Result<OAuthToken, OAuthError> {
    let load_err = |reason: String| OAuthError::Load {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))
}

/// Write `token` as pretty JSON, owner-only permissions on unix.
pub fn write_token_file(path: &Path, token: &OAuthToken) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(parent)?;
    }

    let json = serde_json::to_string_pretty(token)?;
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    std::io::Write::write_all(&mut file, json.as_bytes())?;

    // `mode` only applies on create; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

// ─────────────────────────────────────────────
// TokenManager
// ─────────────────────────────────────────────

pub struct TokenManager {
    client: reqwest::Client,
    token_url: String,
    path: PathBuf,
    token: Mutex<Option<OAuthToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("path", &self.path)
            .finish()
    }
}

impl TokenManager {
    /// A manager persisting to `path`, starting with `token`.
    pub fn new(
        path: impl Into<PathBuf>,
        token_url: Option<&str>,
        token: Option<OAuthToken>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(DEFAULT_TIMEOUT)?,
            token_url: token_url
                .filter(|u| !u.is_empty())
                .unwrap_or(DEFAULT_TOKEN_URL)
                .to_string(),
            path: path.into(),
            token: Mutex::new(token),
        })
    }

    /// Load from `configured` (or the default credentials file), falling back
    /// to the Qwen Code location. Never fails on a missing or broken file:
    /// the manager starts tokenless and persists to the primary path.
    pub fn load(configured: Option<&Path>, token_url: Option<&str>) -> Result<Self, LlmError> {
        let primary = configured
            .map(Path::to_path_buf)
            .unwrap_or_else(default_credentials_path);

        let (path, token) = match read_token_file(&primary) {
            Ok(token) => (primary, Some(token)),
            Err(primary_err) => {
                let fallback = fallback_credentials_path();
                match read_token_file(&fallback) {
                    Ok(token) => {
                        debug!(path = %fallback.display(), "Loaded Qwen Code credentials");
                        (fallback, Some(token))
                    }
                    Err(_) => {
                        warn!(error = %primary_err, "No Qwen OAuth credentials, continuing without a token");
                        (primary, None)
                    }
                }
            }
        };

        if token.as_ref().is_some_and(OAuthToken::is_expired) {
            warn!("Qwen OAuth token appears expired, will refresh before use");
        }

        Self::new(path, token_url, token)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> Option<OAuthToken> {
        self.token.lock().await.clone()
    }

    /// Snapshot without waiting; `None` while a refresh holds the lock.
    pub fn try_token(&self) -> Option<OAuthToken> {
        self.token.try_lock().ok().and_then(|guard| guard.clone())
    }

    /// No token counts as expired.
    pub async fn is_expired(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .map_or(true, OAuthToken::is_expired)
    }

    /// Refresh unconditionally.
    pub async fn refresh(&self) -> Result<OAuthToken, OAuthError> {
        let mut guard = self.token.lock().await;
        self.refresh_locked(&mut guard).await
    }

    /// The current token, refreshed first when expired. A failed refresh is
    /// logged and the stale token returned; the server has the last word.
    pub async fn valid_token(&self) -> Option<OAuthToken> {
        let mut guard = self.token.lock().await;
        // Re-checked under the lock: a concurrent caller may have refreshed.
        let expired = guard.as_ref().map(OAuthToken::is_expired)?;
        if expired {
            if let Err(e) = self.refresh_locked(&mut guard).await {
                warn!(error = %e, "Qwen token refresh failed, trying the stale token");
            }
        }
        guard.clone()
    }

    /// Refresh after the server rejected `rejected_access`, unless another
    /// caller has already replaced it.
    pub async fn refresh_after_rejection(
        &self,
        rejected_access: &str,
    ) -> Result<OAuthToken, OAuthError> {
        let mut guard = self.token.lock().await;
        if let Some(current) = guard.as_ref() {
            if current.access_token != rejected_access {
                return Ok(current.clone());
            }
        }
        self.refresh_locked(&mut guard).await
    }

    /// Store an externally obtained token and persist it.
    pub async fn set_token(
        &self,
        access_token: &str,
        refresh_token: &str,
        resource_url: &str,
        expiry_date: i64,
    ) -> Result<(), OAuthError> {
        let token = OAuthToken {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh_token.to_string(),
            resource_url: resource_url.to_string(),
            expiry_date,
        };
        write_token_file(&self.path, &token).map_err(|e| OAuthError::Persist(e.to_string()))?;
        *self.token.lock().await = Some(token);
        Ok(())
    }

    async fn refresh_locked(
        &self,
        slot: &mut Option<OAuthToken>,
    ) -> Result<OAuthToken, OAuthError> {
        let client_id = std::env::var(CLIENT_ID_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(OAuthError::MissingClientId)?;
        let client_secret = std::env::var(CLIENT_SECRET_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(OAuthError::MissingClientSecret)?;

        let current = slot
            .as_mut()
            .filter(|t| !t.refresh_token.is_empty())
            .ok_or(OAuthError::NoRefreshToken)?;

        debug!(url = %self.token_url, "Refreshing Qwen OAuth token");

        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token: &current.refresh_token,
                client_id: &client_id,
                client_secret: &client_secret,
            })
            .send()
            .await
            .map_err(|e| OAuthError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::Request(e.to_string()))?;
        if status != reqwest::StatusCode::OK {
            return Err(OAuthError::RefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        let refreshed: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        if refreshed.access_token.is_empty() {
            return Err(OAuthError::MissingAccessToken);
        }

        current.access_token = refreshed.access_token;
        current.token_type = if refreshed.token_type.is_empty() {
            "Bearer".to_string()
        } else {
            refreshed.token_type
        };
        current.expiry_date = Utc::now().timestamp_millis() + refreshed.expires_in * 1000;
        if !refreshed.refresh_token.is_empty() {
            current.refresh_token = refreshed.refresh_token;
        }
        let updated = current.clone();

        write_token_file(&self.path, &updated).map_err(|e| OAuthError::Persist(e.to_string()))?;
        info!("Qwen OAuth token refreshed");
        Ok(updated)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
