//! FFmpeg subprocess handling for audio conversion
//!
//! ffmpeg is run with `-progress pipe:1`, which makes it print blocks of
//! `key=value` lines on stdout, each block closed by `progress=continue` or
//! `progress=end`. The `out_time_us` of each block, measured against the
//! input duration, is the fractional progress we report. stderr is kept for
//! the error message.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::core::BitrateKbps;
use crate::error::EncodeError;
use crate::tools::last_stderr_line;

/// Container/format of every converted file
pub const OUTPUT_FORMAT: &str = "mp3";

/// ffmpeg encoder used for [`OUTPUT_FORMAT`]
pub const OUTPUT_CODEC: &str = "libmp3lame";

/// Output channel count (stereo)
pub const OUTPUT_CHANNELS: u8 = 2;

/// Output sample rate
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 44_100;

/// Everything the encoder needs for one file
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSpec {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: &'static str,
    pub codec: &'static str,
    pub bitrate: BitrateKbps,
    pub channels: u8,
    pub sample_rate_hz: u32,
    /// Input duration, used to turn encoder timestamps into progress
    pub duration_seconds: f64,
}

impl EncodeSpec {
    /// Stereo 44.1 kHz MP3 at `bitrate`
    pub fn mp3(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        bitrate: BitrateKbps,
        duration_seconds: f64,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            format: OUTPUT_FORMAT,
            codec: OUTPUT_CODEC,
            bitrate,
            channels: OUTPUT_CHANNELS,
            sample_rate_hz: OUTPUT_SAMPLE_RATE_HZ,
            duration_seconds,
        }
    }
}

/// Something that turns an input file into an encoded output file
///
/// `on_progress` receives percentages in `0.0..=100.0`. They are usually,
/// but not necessarily, non-decreasing. The call resolves once the encoder
/// has finished, successfully or not.
#[allow(async_fn_in_trait)]
pub trait MediaEncoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError>;
}

impl<T: MediaEncoder + ?Sized> MediaEncoder for &T {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError> {
        (**self).encode(spec, on_progress).await
    }
}

/// Encoder backed by an ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl MediaEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError> {
        let tool = self.program.display().to_string();

        log::debug!(
            "Encoding: {} -> {} at {}",
            spec.input_path.display(),
            spec.output_path.display(),
            spec.bitrate
        );

        let mut child = Command::new(&self.program)
            .args(build_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An interrupted batch drops this future; take ffmpeg down with it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    EncodeError::ToolNotFound { tool: tool.clone() }
                } else {
                    EncodeError::Spawn {
                        tool: tool.clone(),
                        source,
                    }
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncodeError::failed("ffmpeg stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncodeError::failed("ffmpeg stderr was not captured"))?;

        let read_progress = pump_progress(BufReader::new(stdout), spec.duration_seconds, on_progress);
        let read_stderr = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };

        let (progress_result, stderr_result) = tokio::join!(read_progress, read_stderr);

        if let Err(e) = progress_result {
            log::debug!("Lost ffmpeg progress stream: {}", e);
        }
        let stderr = stderr_result.unwrap_or_default();

        let status = child
            .wait()
            .await
            .map_err(|source| EncodeError::Spawn { tool, source })?;

        if status.success() {
            Ok(())
        } else {
            let reason = match last_stderr_line(&stderr) {
                Some(line) => format!("ffmpeg exited with {}: {}", status, line),
                None => format!("ffmpeg exited with {}", status),
            };
            Err(EncodeError::failed(reason))
        }
    }
}

/// ffmpeg arguments for one encode
pub fn build_args(spec: &EncodeSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(spec.input_path.clone().into_os_string());

    // -vn: MP4 cover art would otherwise be carried as a video stream
    args.extend(
        [
            "-vn".to_string(),
            "-f".to_string(),
            spec.format.to_string(),
            "-codec:a".to_string(),
            spec.codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", spec.bitrate.kbps()),
            "-ac".to_string(),
            spec.channels.to_string(),
            "-ar".to_string(),
            spec.sample_rate_hz.to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );

    args.push(spec.output_path.clone().into_os_string());
    args
}

/// One meaningful line of ffmpeg's `-progress` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Encoded position in seconds
    OutTime(f64),
    /// End of a progress block; more to come
    Continue,
    /// Final progress block
    End,
}

/// Parse a `key=value` line from `-progress` output
///
/// `out_time_ms` is, despite its name, in microseconds; it is what older
/// ffmpeg builds print instead of `out_time_us`.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.trim().parse().ok()?;
            Some(ProgressLine::OutTime(micros.max(0) as f64 / 1_000_000.0))
        }
        "progress" => match value.trim() {
            "end" => Some(ProgressLine::End),
            _ => Some(ProgressLine::Continue),
        },
        _ => None,
    }
}

/// Percentage of `duration_seconds` covered by `position_seconds`
pub fn progress_percent(position_seconds: f64, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 || !duration_seconds.is_finite() {
        return 0.0;
    }
    (position_seconds / duration_seconds * 100.0).clamp(0.0, 100.0)
}

/// Read a `-progress` stream to its end, reporting once per block
async fn pump_progress<R>(
    reader: R,
    duration_seconds: f64,
    on_progress: &mut dyn FnMut(f64),
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut position: Option<f64> = None;

    while let Some(line) = lines.next_line().await? {
        match parse_progress_line(&line) {
            Some(ProgressLine::OutTime(seconds)) => position = Some(seconds),
            Some(ProgressLine::Continue) => {
                if let Some(seconds) = position.take() {
                    on_progress(progress_percent(seconds, duration_seconds));
                }
            }
            Some(ProgressLine::End) => {
                on_progress(100.0);
                position = None;
            }
            None => {}
        }
    }

    Ok(())
}
