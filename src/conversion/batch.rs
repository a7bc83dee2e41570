//! Batch conversion of a whole directory
//!
//! Files are converted in listing order. With `jobs == 1` (the default) one
//! file is in flight at a time; larger values let up to `jobs` encodes
//! overlap on the current task while results are still collected in
//! worklist order. When two inputs map to the same output path only the
//! first is converted; the others are recorded as failures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use super::ffmpeg::MediaEncoder;
use super::job::{ConversionRequest, EncodeJob, resolve_bitrate};
use super::report::{BatchReport, ConversionResult, FailedConversion};
use crate::audio::DurationProbe;
use crate::core::{
    BitrateKbps, Settings, SizeBudget, ensure_dir, estimate_output_size, find_source_files,
    output_path_in, sibling_output_path,
};
use crate::error::{ConvertError, FilesystemError, ProbeError};

/// How a batch is run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub budget: SizeBudget,
    pub source_extension: String,
    pub target_extension: String,
    /// Explicit bitrate for every file
    pub bitrate: Option<u32>,
    pub jobs: usize,
    pub remove_partial_outputs: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl BatchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            budget: settings.max_size_bytes,
            source_extension: settings.source_extension.clone(),
            target_extension: settings.target_extension.clone(),
            bitrate: None,
            jobs: settings.jobs,
            remove_partial_outputs: settings.remove_partial_outputs,
        }
    }
}

/// What happened to one file of a batch
#[derive(Debug)]
pub enum BatchEvent<'a> {
    Started {
        index: usize,
        total: usize,
        input_path: &'a Path,
        output_path: &'a Path,
    },
    /// Probing is done and the encoder is about to write `output_path`
    Encoding {
        index: usize,
        output_path: &'a Path,
    },
    Progress {
        index: usize,
        percent: u8,
    },
    Finished {
        index: usize,
        input_path: &'a Path,
        outcome: &'a Result<ConversionResult, ConvertError>,
    },
}

/// Dry-run estimate for one file
#[derive(Debug)]
pub struct PlannedConversion {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub estimate: Result<SizeEstimate, ProbeError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEstimate {
    pub duration_seconds: f64,
    pub bitrate: BitrateKbps,
    pub estimated_size_bytes: u64,
}

/// For each request, the earlier input that already claimed its output path
fn output_claims(requests: &[ConversionRequest]) -> Vec<Option<&Path>> {
    let mut owners: HashMap<&Path, &Path> = HashMap::new();
    requests
        .iter()
        .map(|request| {
            let owner = *owners
                .entry(request.output_path.as_path())
                .or_insert(request.input_path.as_path());
            (owner != request.input_path.as_path()).then_some(owner)
        })
        .collect()
}

/// Runs [`EncodeJob`]s over a directory and aggregates a [`BatchReport`]
pub struct BatchRunner<P, E> {
    probe: P,
    encoder: E,
    options: BatchOptions,
}

impl<P, E> BatchRunner<P, E>
where
    P: DurationProbe,
    E: MediaEncoder,
{
    pub fn new(probe: P, encoder: E, options: BatchOptions) -> Self {
        Self {
            probe,
            encoder,
            options,
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Convert every source file of `input_dir` into `output_dir`
    pub async fn run_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<BatchReport, FilesystemError> {
        self.run_batch_with(input_dir, output_dir, &|_| {}).await
    }

    /// Like [`run_batch`](Self::run_batch), reporting each step to `on_event`
    ///
    /// Only listing `input_dir` and creating `output_dir` can fail the whole
    /// batch. Per-file failures are logged, recorded and skipped.
    pub async fn run_batch_with(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        on_event: &dyn Fn(BatchEvent<'_>),
    ) -> Result<BatchReport, FilesystemError> {
        let inputs = find_source_files(input_dir, &self.options.source_extension)?;
        ensure_dir(output_dir).await?;

        let total = inputs.len();
        let mut report = BatchReport::new(total);

        if inputs.is_empty() {
            log::info!(
                "No .{} files found in {}",
                self.options.source_extension,
                input_dir.display()
            );
            report.finish();
            return Ok(report);
        }

        let jobs = self.options.jobs.max(1);
        log::debug!(
            "Converting {} file(s) from {} to {} ({} at a time)",
            total,
            input_dir.display(),
            output_dir.display(),
            jobs
        );

        let requests: Vec<ConversionRequest> = inputs
            .into_iter()
            .map(|input| {
                let output = output_path_in(output_dir, &input, &self.options.target_extension);
                ConversionRequest::new(input, output).with_bitrate(self.options.bitrate)
            })
            .collect();

        let claims = output_claims(&requests);
        let outcomes: Vec<Result<ConversionResult, ConvertError>> =
            stream::iter(requests.iter().zip(claims).enumerate())
                .map(|(index, (request, claimed_by))| {
                    self.convert_one(index, total, request, claimed_by, on_event)
                })
                .buffered(jobs)
                .collect()
                .await;

        for (request, outcome) in requests.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => report.record_success(result),
                Err(e) => report.record_failure(FailedConversion {
                    input_path: request.input_path,
                    output_path: request.output_path,
                    reason: e.to_string(),
                }),
            }
        }

        report.finish();
        log::debug!(
            "Batch finished: {} succeeded, {} failed, {} total",
            report.success_count,
            report.failed_count,
            report.total_count
        );

        Ok(report)
    }

    /// Convert one file; `output` defaults to the input with the target extension
    ///
    /// Reports the same events as a one-file batch.
    pub async fn run_single(
        &self,
        input: &Path,
        output: Option<&Path>,
        on_event: &dyn Fn(BatchEvent<'_>),
    ) -> Result<ConversionResult, ConvertError> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_output_path(input, &self.options.target_extension));
        let request = ConversionRequest::new(input, output).with_bitrate(self.options.bitrate);

        self.convert_one(0, 1, &request, None, on_event).await
    }

    /// Probe every source file and estimate its output without encoding
    pub async fn plan_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<Vec<PlannedConversion>, FilesystemError> {
        let inputs = find_source_files(input_dir, &self.options.source_extension)?;
        let mut plan = Vec::with_capacity(inputs.len());

        for input in inputs {
            let estimate = self.probe.probe(&input).await.map(|duration_seconds| {
                let bitrate = resolve_bitrate(self.options.bitrate, duration_seconds, self.options.budget);
                SizeEstimate {
                    duration_seconds,
                    bitrate,
                    estimated_size_bytes: estimate_output_size(bitrate, duration_seconds),
                }
            });
            let output_path = output_path_in(output_dir, &input, &self.options.target_extension);
            plan.push(PlannedConversion {
                input_path: input,
                output_path,
                estimate,
            });
        }

        Ok(plan)
    }

    async fn convert_one(
        &self,
        index: usize,
        total: usize,
        request: &ConversionRequest,
        claimed_by: Option<&Path>,
        on_event: &dyn Fn(BatchEvent<'_>),
    ) -> Result<ConversionResult, ConvertError> {
        on_event(BatchEvent::Started {
            index,
            total,
            input_path: &request.input_path,
            output_path: &request.output_path,
        });

        let outcome = match claimed_by {
            Some(owner) => Err(ConvertError::OutputCollision {
                output_path: request.output_path.clone(),
                claimed_by: owner.to_path_buf(),
            }),
            None => {
                let job = EncodeJob::new(&self.probe, &self.encoder, self.options.budget);
                job.run_with(
                    request,
                    || {
                        on_event(BatchEvent::Encoding {
                            index,
                            output_path: &request.output_path,
                        })
                    },
                    |percent| on_event(BatchEvent::Progress { index, percent }),
                )
                .await
            }
        };

        // Observers tell the user; the terminal stays free for progress bars.
        if let Err(e) = &outcome {
            log::debug!(
                "Failed ({}/{}): {}: {}",
                index + 1,
                total,
                request.input_path.display(),
                e
            );
            self.clean_up_after(e, &request.output_path).await;
        }

        on_event(BatchEvent::Finished {
            index,
            input_path: &request.input_path,
            outcome: &outcome,
        });
        outcome
    }

    /// Drop what a failed encode left behind. Nothing else ever wrote to the output.
    async fn clean_up_after(&self, error: &ConvertError, output_path: &Path) {
        if self.options.remove_partial_outputs && matches!(error, ConvertError::Encode(_)) {
            remove_partial_output(output_path).await;
        }
    }
}

/// Remove an incomplete output file if there is one
pub async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove partial output {}: {}", path.display(), e),
    }
}
