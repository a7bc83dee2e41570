//! Converter settings
//!
//! Settings come from an optional JSON file and are then overridden by
//! command line flags. Every field has a default so an empty object (or no
//! file at all) is a valid configuration.
//!
//! Default location: `<config_dir>/m4a2mp3/settings.json`

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::bitrate::SizeBudget;
use crate::conversion::OUTPUT_FORMAT;
use crate::error::SettingsError;

/// Which duration probe to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Run `ffprobe` as a subprocess
    #[default]
    Ffprobe,
    /// Read the container in-process
    Native,
}

/// Converter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Per-file output ceiling in bytes
    pub max_size_bytes: SizeBudget,
    /// Explicit ffmpeg binary (otherwise looked up on PATH)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary (otherwise looked up on PATH)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
    pub probe: ProbeBackend,
    /// Files encoded at once. 1 keeps the batch strictly sequential.
    pub jobs: usize,
    /// Delete whatever a failed encode left at the output path
    pub remove_partial_outputs: bool,
    pub log_level: String,
    /// Also append debug logs to the log file
    pub log_to_file: bool,
    /// Extension (without dot) of files picked up from the input directory
    pub source_extension: String,
    /// Extension (without dot) given to converted files. Always some
    /// spelling of `mp3`, since that is what the encoder writes.
    pub target_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_size_bytes: SizeBudget::default(),
            ffmpeg_path: None,
            ffprobe_path: None,
            probe: ProbeBackend::default(),
            jobs: 1,
            remove_partial_outputs: true,
            log_level: "info".to_string(),
            log_to_file: true,
            source_extension: "m4a".to_string(),
            target_extension: "mp3".to_string(),
        }
    }
}

impl Settings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Default settings file location, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("m4a2mp3").join(Self::SETTINGS_FILE))
    }

    /// Load settings
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        let settings = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_from(&path)?,
                _ => {
                    log::debug!("No settings file, using defaults");
                    Self::default()
                }
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.jobs == 0 {
            return Err(SettingsError::Invalid("jobs must be at least 1".to_string()));
        }

        for (name, ext) in [
            ("source_extension", &self.source_extension),
            ("target_extension", &self.target_extension),
        ] {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(SettingsError::Invalid(format!(
                    "{} must be a bare extension like \"mp3\", got {:?}",
                    name, ext
                )));
            }
        }

        if !self.target_extension.eq_ignore_ascii_case(OUTPUT_FORMAT) {
            return Err(SettingsError::Invalid(format!(
                "target_extension must be {:?}, the only output format, got {:?}",
                OUTPUT_FORMAT, self.target_extension
            )));
        }

        if self.source_extension.eq_ignore_ascii_case(&self.target_extension) {
            return Err(SettingsError::Invalid(
                "source and target extensions must differ".to_string(),
            ));
        }

        self.level_filter()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn level_filter(&self) -> Result<LevelFilter, SettingsError> {
        LevelFilter::from_str(&self.log_level).map_err(|_| {
            SettingsError::Invalid(format!("unknown log level {:?}", self.log_level))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_size_bytes.bytes(), 16 * 1024 * 1024);
        assert_eq!(settings.jobs, 1);
        assert_eq!(settings.probe, ProbeBackend::Ffprobe);
        assert!(settings.remove_partial_outputs);
        assert_eq!(settings.source_extension, "m4a");
        assert_eq!(settings.target_extension, "mp3");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_object_is_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_overrides_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "max_size_bytes": 8388608, "probe": "native", "jobs": 2 }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.max_size_bytes.bytes(), 8 * 1024 * 1024);
        assert_eq!(settings.probe, ProbeBackend::Native);
        assert_eq!(settings.jobs, 2);
        assert_eq!(settings.target_extension, "mp3");
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let result: Result<Settings, _> = serde_json::from_str(r#"{ "max_size_bytes": 0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<Settings, _> = serde_json::from_str(r#"{ "max_size": 5 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Settings::load(Some(&temp_dir.path().join("nope.json")));
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = Settings {
            jobs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            target_extension: ".mp3".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            target_extension: "M4A".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            log_level: "loud".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_target_extension_must_match_output_format() {
        let settings = Settings {
            target_extension: "ogg".to_string(),
            ..Settings::default()
        };
        match settings.validate() {
            Err(SettingsError::Invalid(message)) => assert!(message.contains("ogg")),
            other => panic!("unexpected: {:?}", other),
        }

        let settings = Settings {
            target_extension: "MP3".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_level_filter_parses() {
        let settings = Settings {
            log_level: "debug".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.level_filter().unwrap(), LevelFilter::Debug);
    }
}
