//! External tool lookup and subprocess output helpers.

use std::path::{Path, PathBuf};

/// Resolve an external tool
///
/// An explicitly configured path wins and is used as-is. Otherwise the tool
/// is looked up on `PATH`.
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    match which::which(name) {
        Ok(path) => {
            log::debug!("Found {} at {}", name, path.display());
            Some(path)
        }
        Err(e) => {
            log::debug!("{} not found on PATH: {}", name, e);
            None
        }
    }
}

/// Last non-empty line of a tool's stderr, trimmed
///
/// ffmpeg and ffprobe print their actual complaint last.
pub fn last_stderr_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}
