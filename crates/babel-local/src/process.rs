//! Running the inference binary as a cancellable subprocess.
//!
//! The child is started in its own process group. If the caller's future is
//! dropped, or the timeout fires, the whole group is killed so helper
//! processes spawned by the binary do not outlive the request.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use babel_core::error::LlmError;

/// Kills the child's process group on drop unless disarmed.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            debug!(pgid, "Killing inference process group");
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: signalling a process group we created; a stale id only yields ESRCH.
    unsafe {
        libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Run `binary` with `args`, returning captured stdout.
///
/// A non-zero exit status becomes [`LlmError::Execution`] with stderr
/// embedded; the deadline becomes [`LlmError::Timeout`]. Stderr is ignored
/// when the exit status is zero, since llama-cli logs model loading there.
pub async fn run_inference(
    binary: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<String, LlmError> {
    let program = binary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| binary.display().to_string());

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LlmError::ExecutableNotFound(binary.display().to_string())
        } else {
            LlmError::Execution {
                message: format!("failed to start {program}: {e}"),
                stderr: String::new(),
            }
        }
    })?;

    let mut guard = ProcessGroupGuard::new(child.id());
    debug!(program = %program, args = args.len(), timeout_secs = timeout.as_secs(), "Spawned inference process");

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(LlmError::Execution {
                message: format!("failed to wait for {program}: {e}"),
                stderr: String::new(),
            })
        }
        Err(_) => {
            warn!(program = %program, timeout_secs = timeout.as_secs(), "Inference timed out");
            return Err(LlmError::Timeout {
                provider: program,
                secs: timeout.as_secs(),
            });
        }
    };
    guard.disarm();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let message = if stderr.is_empty() {
            format!("{program} exited with status {code}")
        } else {
            format!("{program} exited with status {code}: {stderr}")
        };
        return Err(LlmError::Execution { message, stderr });
    }

    Ok(stdout)
}

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok())
        .as_ref()
}

/// Strip terminal escape codes and an echoed `prompt` from raw output.
pub fn clean_output(raw: &str, prompt: &str) -> String {
    let text = match ansi_regex() {
        Some(re) => re.replace_all(raw, "").to_string(),
        None => raw.to_string(),
    };

    let trimmed = text.trim_start();
    if !prompt.is_empty() {
        if let Some(rest) = trimmed.strip_prefix(prompt) {
            return rest.to_string();
        }
    }
    text
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
