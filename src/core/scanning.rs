//! Worklist discovery
//!
//! Finds the source files of one batch run and derives where their converted
//! counterparts go. The input directory is listed once, non-recursively, and
//! the listing order is kept as the worklist order.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::audio::has_extension;
use crate::error::FilesystemError;

/// List the files in `dir` whose extension matches `extension`
///
/// Only the top level of `dir` is considered. An unreadable `dir` is an
/// error; unreadable individual entries are logged and skipped.
pub fn find_source_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, FilesystemError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(FilesystemError::ReadDir {
                    path: dir.to_path_buf(),
                    source: e.into(),
                });
            }
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }

    log::debug!(
        "Found {} .{} file(s) in {}",
        files.len(),
        extension,
        dir.display()
    );

    Ok(files)
}

/// Output path for `input` inside `output_dir` with the extension swapped
pub fn output_path_in(output_dir: &Path, input: &Path, extension: &str) -> PathBuf {
    let mut name: OsString = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".");
    name.push(extension);
    output_dir.join(name)
}

/// Output path next to `input` with the extension swapped
pub fn sibling_output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// Create `dir` and its parents if missing. Existing contents are untouched.
pub async fn ensure_dir(dir: &Path) -> Result<(), FilesystemError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| FilesystemError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

/// Format duration as "3:07"
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds.max(0.0).round() as u64;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{}:{:02}", mins, secs)
}

/// Format size in binary megabytes, matching how the ceiling is expressed
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.2} MB", bytes as f64 / MIB)
}
