//! Duration probing
//!
//! [`DurationProbe`] is the seam the encode job depends on. Two backends
//! exist: [`FfprobeProbe`] asks `ffprobe` in a subprocess, and
//! [`NativeProbe`](super::NativeProbe) reads the container in-process.
//! [`Probe`] picks one at runtime from the settings.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::metadata::NativeProbe;
use crate::error::ProbeError;
use crate::tools::last_stderr_line;

/// Something that can tell how long a media file plays
#[allow(async_fn_in_trait)]
pub trait DurationProbe {
    /// Playback duration in seconds. Always finite and positive on success.
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError>;
}

impl<T: DurationProbe + ?Sized> DurationProbe for &T {
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        (**self).probe(path).await
    }
}

/// Runtime-selected probe backend
#[derive(Debug, Clone)]
pub enum Probe {
    Ffprobe(FfprobeProbe),
    Native(NativeProbe),
}

impl DurationProbe for Probe {
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        match self {
            Probe::Ffprobe(probe) => probe.probe(path).await,
            Probe::Native(probe) => probe.probe(path).await,
        }
    }
}

/// Probe durations with `ffprobe -show_format`
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DurationProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        // ffprobe's own message for a missing file is less clear than ours.
        tokio::fs::metadata(path)
            .await
            .map_err(|source| ProbeError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ToolNotFound {
                        tool: self.program.display().to_string(),
                    }
                } else {
                    ProbeError::Spawn {
                        tool: self.program.display().to_string(),
                        source,
                    }
                }
            })?;

        if !output.status.success() {
            let message = last_stderr_line(&output.stderr)
                .unwrap_or_else(|| format!("exited with {}", output.status));
            return Err(ProbeError::ToolFailed {
                tool: "ffprobe".to_string(),
                path: path.to_path_buf(),
                message,
            });
        }

        let duration = parse_ffprobe_duration(path, &output.stdout)?;
        log::debug!("{}: {:.2}s (ffprobe)", path.display(), duration);
        Ok(duration)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Pull `format.duration` out of `ffprobe -print_format json` output
fn parse_ffprobe_duration(path: &Path, stdout: &[u8]) -> Result<f64, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    output
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .ok_or_else(|| ProbeError::NoDuration {
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(json: &str) -> Result<f64, ProbeError> {
        parse_ffprobe_duration(Path::new("/in/song.m4a"), json.as_bytes())
    }

    #[test]
    fn test_parses_format_duration() {
        let json = r#"{
            "format": {
                "filename": "song.m4a",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "187.034000",
                "size": "3021932"
            }
        }"#;
        assert!((parse(json).unwrap() - 187.034).abs() < 1e-9);
    }

    #[test]
    fn test_missing_or_unusable_duration() {
        assert!(matches!(
            parse(r#"{ "format": { "filename": "x" } }"#),
            Err(ProbeError::NoDuration { .. })
        ));
        assert!(matches!(
            parse(r#"{ "format": { "duration": "N/A" } }"#),
            Err(ProbeError::NoDuration { .. })
        ));
        assert!(matches!(
            parse(r#"{ "format": { "duration": "0.000000" } }"#),
            Err(ProbeError::NoDuration { .. })
        ));
        assert!(matches!(parse("{}"), Err(ProbeError::NoDuration { .. })));
    }

    #[test]
    fn test_garbage_output_is_parse_error() {
        assert!(matches!(parse("not json"), Err(ProbeError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_missing_input_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let probe = FfprobeProbe::new("ffprobe");
        let result = probe.probe(&temp_dir.path().join("missing.m4a")).await;
        assert!(matches!(result, Err(ProbeError::Unreadable { .. })));
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("song.m4a");
        std::fs::write(&input, "not really audio").unwrap();

        let probe = FfprobeProbe::new(temp_dir.path().join("no-such-ffprobe"));
        let result = probe.probe(&input).await;
        assert!(matches!(result, Err(ProbeError::ToolNotFound { .. })));
    }
}
