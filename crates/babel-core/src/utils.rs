//! Utility helpers: path resolution.

use std::path::PathBuf;

/// Get the Babel data directory (e.g. `~/.babel/`).
pub fn get_data_path() -> PathBuf {
    home_dir().join(".babel")
}

/// Directory shared with the desktop translator (`~/.translator/`): OAuth
/// credentials and downloaded models live here.
pub fn get_translator_path() -> PathBuf {
    home_dir().join(".translator")
}

/// Default GGUF model directory (`~/.translator/models/`).
pub fn get_models_path() -> PathBuf {
    get_translator_path().join("models")
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Home directory, or `.` when it cannot be determined.
pub fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
