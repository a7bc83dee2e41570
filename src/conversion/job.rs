//! Single-file conversion
//!
//! An [`EncodeJob`] takes one [`ConversionRequest`] through probe, bitrate
//! sizing, encode and the final size check. It holds no state between runs;
//! the batch runner builds one per file.

use std::path::{Path, PathBuf};

use super::ffmpeg::{EncodeSpec, MediaEncoder};
use super::report::{ConversionResult, SizeStatus};
use crate::audio::DurationProbe;
use crate::core::{BitrateKbps, SizeBudget, calculate_bitrate, ensure_dir};
use crate::error::{ConvertError, FilesystemError};

/// One file to convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Explicit bitrate in kbps; computed from the budget when absent
    pub bitrate: Option<u32>,
}

impl ConversionRequest {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            bitrate: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: Option<u32>) -> Self {
        self.bitrate = bitrate;
        self
    }
}

/// Pick the bitrate for a file
///
/// An explicit bitrate wins but is still clamped into the MP3 range.
pub fn resolve_bitrate(explicit: Option<u32>, duration_seconds: f64, budget: SizeBudget) -> BitrateKbps {
    match explicit {
        Some(requested) => {
            let bitrate = BitrateKbps::clamped(requested);
            if bitrate.kbps() != requested {
                log::debug!(
                    "Requested bitrate {} kbps is out of range, using {}",
                    requested,
                    bitrate
                );
            }
            bitrate
        }
        None => calculate_bitrate(duration_seconds, budget),
    }
}

/// Drives one file through probe, encode and size check
pub struct EncodeJob<'a, P, E> {
    probe: &'a P,
    encoder: &'a E,
    budget: SizeBudget,
}

impl<'a, P, E> EncodeJob<'a, P, E>
where
    P: DurationProbe,
    E: MediaEncoder,
{
    pub fn new(probe: &'a P, encoder: &'a E, budget: SizeBudget) -> Self {
        Self {
            probe,
            encoder,
            budget,
        }
    }

    /// Convert one file, reporting whole percentages to `on_progress`
    ///
    /// A failed encode may leave a partial file at the output path; removing
    /// it is up to the caller.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        on_progress: impl FnMut(u8),
    ) -> Result<ConversionResult, ConvertError> {
        self.run_with(request, || {}, on_progress).await
    }

    /// Like [`run`](Self::run), calling `on_encoding` right before the
    /// encoder starts writing the output
    ///
    /// Nothing at the output path is touched before `on_encoding` fires.
    pub async fn run_with(
        &self,
        request: &ConversionRequest,
        on_encoding: impl FnOnce(),
        mut on_progress: impl FnMut(u8),
    ) -> Result<ConversionResult, ConvertError> {
        let input = request.input_path.as_path();
        let output = request.output_path.as_path();

        let duration_seconds = self.probe.probe(input).await?;
        let bitrate = resolve_bitrate(request.bitrate, duration_seconds, self.budget);
        let input_size_bytes = file_size(input).await?;

        log::debug!(
            "Converting {} ({:.1}s) at {}",
            input.display(),
            duration_seconds,
            bitrate
        );

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent).await?;
        }

        let spec = EncodeSpec::mp3(input, output, bitrate, duration_seconds);
        on_encoding();
        self.encoder
            .encode(&spec, &mut |percent: f64| on_progress(whole_percent(percent)))
            .await?;

        let output_size_bytes = file_size(output).await?;
        let status = SizeStatus::for_size(output_size_bytes, self.budget);
        if status == SizeStatus::OverLimit {
            log::debug!(
                "{} is {} bytes, over the {} byte limit",
                output.display(),
                output_size_bytes,
                self.budget.bytes()
            );
        }

        Ok(ConversionResult {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            input_size_bytes,
            output_size_bytes,
            bitrate,
            duration_seconds,
            status,
        })
    }
}

fn whole_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.round().clamp(0.0, 100.0) as u8
}

async fn file_size(path: &Path) -> Result<u64, FilesystemError> {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.len())
        .map_err(|source| FilesystemError::Stat {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::test_fixtures::{FakeEncoder, FakeProbe, write_inputs};
    use tempfile::TempDir;

    const SIXTEEN_MIB: u64 = 16 * 1024 * 1024;

    #[test]
    fn test_whole_percent() {
        assert_eq!(whole_percent(0.0), 0);
        assert_eq!(whole_percent(49.5), 50);
        assert_eq!(whole_percent(99.4), 99);
        assert_eq!(whole_percent(130.0), 100);
        assert_eq!(whole_percent(-3.0), 0);
        assert_eq!(whole_percent(f64::NAN), 0);
    }

    #[test]
    fn test_resolve_bitrate() {
        let budget = SizeBudget::default();
        assert_eq!(resolve_bitrate(None, 600.0, budget).kbps(), 223);
        assert_eq!(resolve_bitrate(Some(192), 600.0, budget).kbps(), 192);
        assert_eq!(resolve_bitrate(Some(1000), 600.0, budget).kbps(), 320);
        assert_eq!(resolve_bitrate(Some(8), 600.0, budget).kbps(), 64);
    }

    #[tokio::test]
    async fn test_successful_run() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["song.m4a"]);
        let output = temp_dir.path().join("out").join("nested").join("song.mp3");

        let probe = FakeProbe::new(600.0);
        let encoder = FakeEncoder::new(4096).with_progress(&[10.2, 55.5, 100.0]);
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::default());

        let mut seen = Vec::new();
        let result = job
            .run(&ConversionRequest::new(&inputs[0], &output), |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(seen, vec![10, 56, 100]);
        assert_eq!(result.output_path, output);
        assert_eq!(result.output_size_bytes, 4096);
        assert_eq!(result.bitrate.kbps(), 223);
        assert_eq!(result.duration_seconds, 600.0);
        assert_eq!(result.status, SizeStatus::Ok);
        assert!(result.input_size_bytes > 0);
        assert!(output.exists());

        let specs = encoder.calls();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].format, "mp3");
        assert_eq!(specs[0].channels, 2);
        assert_eq!(specs[0].sample_rate_hz, 44_100);
        assert_eq!(specs[0].duration_seconds, 600.0);
    }

    #[tokio::test]
    async fn test_explicit_bitrate_is_used() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["song.m4a"]);
        let output = temp_dir.path().join("song.mp3");

        let probe = FakeProbe::new(60.0);
        let encoder = FakeEncoder::new(100);
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::default());

        let request = ConversionRequest::new(&inputs[0], &output).with_bitrate(Some(128));
        let result = job.run(&request, |_| {}).await.unwrap();

        assert_eq!(result.bitrate.kbps(), 128);
        assert_eq!(encoder.calls()[0].bitrate.kbps(), 128);
    }

    #[tokio::test]
    async fn test_over_limit_status() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["a.m4a", "b.m4a"]);
        let budget = SizeBudget::new(1000).unwrap();

        let probe = FakeProbe::new(10.0);
        let exact = FakeEncoder::new(1000);
        let over = FakeEncoder::new(1001);

        let at_limit = EncodeJob::new(&probe, &exact, budget)
            .run(&ConversionRequest::new(&inputs[0], temp_dir.path().join("a.mp3")), |_| {})
            .await
            .unwrap();
        let past_limit = EncodeJob::new(&probe, &over, budget)
            .run(&ConversionRequest::new(&inputs[1], temp_dir.path().join("b.mp3")), |_| {})
            .await
            .unwrap();

        assert_eq!(at_limit.status, SizeStatus::Ok);
        assert_eq!(past_limit.status, SizeStatus::OverLimit);
    }

    #[tokio::test]
    async fn test_probe_failure_never_encodes() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["broken.m4a"]);
        let output = temp_dir.path().join("broken.mp3");

        let probe = FakeProbe::new(60.0).failing_on("broken.m4a");
        let encoder = FakeEncoder::new(100);
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::new(SIXTEEN_MIB).unwrap());

        let result = job.run(&ConversionRequest::new(&inputs[0], &output), |_| {}).await;

        assert!(matches!(result, Err(ConvertError::Probe(ProbeError::InvalidMedia { .. }))));
        assert!(encoder.calls().is_empty());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_encoding_hook_fires_only_when_encoding() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["good.m4a", "broken.m4a"]);

        let probe = FakeProbe::new(60.0).failing_on("broken.m4a");
        let encoder = FakeEncoder::new(100).with_progress(&[100.0]);
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::default());

        let steps = std::cell::RefCell::new(Vec::new());
        job.run_with(
            &ConversionRequest::new(&inputs[0], temp_dir.path().join("good.mp3")),
            || steps.borrow_mut().push("encoding".to_string()),
            |p| steps.borrow_mut().push(format!("{}%", p)),
        )
        .await
        .unwrap();
        assert_eq!(steps.borrow().as_slice(), ["encoding", "100%"]);

        let mut fired = false;
        let result = job
            .run_with(
                &ConversionRequest::new(&inputs[1], temp_dir.path().join("broken.mp3")),
                || fired = true,
                |_| {},
            )
            .await;
        assert!(result.is_err());
        assert!(!fired);
    }

    #[tokio::test]
    async fn test_encode_failure_leaves_partial_output() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["song.m4a"]);
        let output = temp_dir.path().join("song.mp3");

        let probe = FakeProbe::new(60.0);
        let encoder = FakeEncoder::new(100).failing_on("song.m4a");
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::default());

        let result = job.run(&ConversionRequest::new(&inputs[0], &output), |_| {}).await;

        match result {
            Err(ConvertError::Encode(e)) => assert!(e.to_string().contains("simulated")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_stat_error() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = write_inputs(temp_dir.path(), &["song.m4a"]);
        let output = temp_dir.path().join("song.mp3");

        let probe = FakeProbe::new(60.0);
        let encoder = FakeEncoder::new(100).writing_nothing();
        let job = EncodeJob::new(&probe, &encoder, SizeBudget::default());

        let result = job.run(&ConversionRequest::new(&inputs[0], &output), |_| {}).await;
        assert!(matches!(
            result,
            Err(ConvertError::Filesystem(FilesystemError::Stat { .. }))
        ));
    }
}
