//! Logging configuration for m4a2mp3
//!
//! Logs go to stderr at the requested level and, unless disabled, to a file
//! at debug level:
//! `<data_local_dir>/m4a2mp3/logs/m4a2mp3.log`
//!
//! The file survives between runs, which makes it the thing to look at when
//! a batch went wrong.

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_FILE_NAME: &str = "m4a2mp3.log";

/// Rotate the log file once it grows past this size
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Get the log directory path
pub fn get_log_directory() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("m4a2mp3").join("logs"))
}

/// Initialize the logging system
///
/// `terminal_level` applies to stderr. With `log_to_file` the file receives
/// debug records regardless. Returns the log file path when file logging is
/// active.
pub fn init_logging(terminal_level: LevelFilter, log_to_file: bool) -> Option<PathBuf> {
    let config = log_config();

    let log_file = if log_to_file {
        get_log_directory().and_then(|dir| open_log_file(&dir))
    } else {
        None
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        terminal_level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_path = match log_file {
        Some((path, file)) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
            Some(path)
        }
        None => None,
    };

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    if let Some(path) = &log_path {
        log::debug!("=== m4a2mp3 {} started ===", env!("CARGO_PKG_VERSION"));
        log::debug!("Log file: {}", path.display());
    }

    log_path
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build()
}

/// Create the directory, rotate an oversized log and open it for appending
fn open_log_file(log_dir: &Path) -> Option<(PathBuf, fs::File)> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_if_large(&log_path, MAX_LOG_SIZE);

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some((log_path, file)),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            None
        }
    }
}

/// Move `log_path` aside to `<name>.old` once it exceeds `max_size`
fn rotate_if_large(log_path: &Path, max_size: u64) {
    if let Ok(metadata) = fs::metadata(log_path)
        && metadata.len() > max_size
    {
        let mut backup = log_path.as_os_str().to_owned();
        backup.push(".old");
        let _ = fs::rename(log_path, PathBuf::from(backup));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_directory_is_app_specific() {
        // No data dir for this user means nothing to check.
        if let Some(dir) = get_log_directory() {
            assert!(dir.ends_with("m4a2mp3/logs"));
        }
    }

    #[test]
    fn test_rotate_if_large() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("m4a2mp3.log");

        fs::write(&log_path, vec![b'x'; 64]).unwrap();
        rotate_if_large(&log_path, 100);
        assert!(log_path.exists(), "Small log should stay in place");

        fs::write(&log_path, vec![b'x'; 200]).unwrap();
        rotate_if_large(&log_path, 100);
        assert!(!log_path.exists());
        assert!(temp_dir.path().join("m4a2mp3.log.old").exists());
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("nested").join("logs");

        let (path, _file) = open_log_file(&log_dir).unwrap();
        assert_eq!(path, log_dir.join("m4a2mp3.log"));
        assert!(path.exists());
    }
}
