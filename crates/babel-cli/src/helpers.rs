//! Shared CLI helpers: input reading and output printing.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;

/// Source text from the positional argument, a file, or stdin (in that order).
pub fn read_source(text: Option<String>, input: Option<&Path>) -> Result<String> {
    match (text, input) {
        (Some(_), Some(_)) => bail!("pass either TEXT or --input, not both"),
        (Some(text), None) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path.display())),
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Print a translation to stdout.
pub fn print_translation(text: &str) {
    if text.is_empty() {
        println!("{}", "(empty translation)".dimmed());
    } else {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }
}

/// Byte count as gigabytes, one decimal.
pub fn gb(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_source_from_arg() {
        assert_eq!(read_source(Some("hi".into()), None).unwrap(), "hi");
    }

    #[test]
    fn test_read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.txt");
        std::fs::write(&file, "Привет\n").unwrap();
        assert_eq!(read_source(None, Some(&file)).unwrap(), "Привет\n");
    }

    #[test]
    fn test_read_source_rejects_both() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.txt");
        assert!(read_source(Some("x".into()), Some(&file)).is_err());
    }

    #[test]
    fn test_read_source_missing_file() {
        let err = read_source(None, Some(Path::new("/nonexistent/babel/in.txt"))).unwrap_err();
        assert!(err.to_string().contains("failed to read input file"));
    }

    #[test]
    fn test_gb() {
        assert_eq!(gb(8 * 1024 * 1024 * 1024), "8.0 GB");
        assert_eq!(gb(1536 * 1024 * 1024), "1.5 GB");
    }
}
