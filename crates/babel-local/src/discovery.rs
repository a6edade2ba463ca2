//! Locating the llama.cpp executable.

use std::path::{Path, PathBuf};

use tracing::debug;

use babel_core::error::LlmError;
use babel_core::utils::home_dir;

/// Default inference binary name.
pub const LLAMA_CLI: &str = "llama-cli";

/// Well-known install locations checked after PATH.
fn well_known_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        home_dir().join(".local").join("bin"),
    ]
}

/// Find `name` on PATH, then in the well-known install directories.
pub fn find_executable(name: &str) -> Result<PathBuf, LlmError> {
    if let Ok(path) = which::which(name) {
        debug!(path = %path.display(), "Found {} on PATH", name);
        return Ok(path);
    }
    find_executable_in(name, &well_known_dirs())
}

/// Find `name` in `dirs`, in order.
pub fn find_executable_in(name: &str, dirs: &[PathBuf]) -> Result<PathBuf, LlmError> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .inspect(|path| debug!(path = %path.display(), "Found {}", name))
        .ok_or_else(|| LlmError::ExecutableNotFound(name.to_string()))
}

/// Resolve an explicitly configured binary, or discover the default one.
pub fn resolve_binary(configured: Option<&str>) -> Result<PathBuf, LlmError> {
    match configured {
        Some(path) if !path.is_empty() => {
            let path = babel_core::utils::expand_home(path);
            if is_executable(&path) {
                Ok(path)
            } else {
                Err(LlmError::ExecutableNotFound(path.display().to_string()))
            }
        }
        _ => find_executable(LLAMA_CLI),
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::error::ErrorKind;

    #[cfg(unix)]
    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_not_found_names_executable() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_executable_in("llama-cli-missing", &[dir.path().to_path_buf()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.to_string().contains("not found"));
        assert!(err.to_string().contains("llama-cli-missing"));
    }

    #[cfg(unix)]
    #[test]
    fn test_found_in_second_dir() {
        let empty = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let expected = make_executable(bin.path(), "llama-cli");
        let found = find_executable_in(
            "llama-cli",
            &[empty.path().to_path_buf(), bin.path().to_path_buf()],
        )
        .unwrap();
        assert_eq!(found, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("llama-cli"), "data").unwrap();
        assert!(find_executable_in("llama-cli", &[dir.path().to_path_buf()]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_configured_binary() {
        let dir = tempfile::tempdir().unwrap();
        let bin = make_executable(dir.path(), "my-llama");
        let path_str = bin.to_string_lossy().to_string();
        assert_eq!(resolve_binary(Some(&path_str)).unwrap(), bin);
        assert!(resolve_binary(Some("/definitely/not/here/llama-cli")).is_err());
    }
}
