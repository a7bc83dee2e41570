//! Command line interface
//!
//! ```text
//! m4a2mp3 [INPUT_DIR] [OUTPUT_DIR]
//! m4a2mp3 --single <INPUT> [OUTPUT]
//! ```

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use indicatif::ProgressBar;
use log::LevelFilter;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::audio::{DurationProbe, FfprobeProbe, NativeProbe, Probe};
use crate::conversion::{
    BatchEvent, BatchOptions, BatchReport, BatchRunner, ConversionResult, FfmpegEncoder,
    MediaEncoder, remove_partial_output,
};
use crate::core::{BitrateKbps, ProbeBackend, Settings, SizeBudget};
use crate::error::{ConvertError, FilesystemError};
use crate::logging;
use crate::tools::resolve_tool;
use crate::ui::{BatchProgress, render_plan, render_summary, result_line, single_file_bar};

/// Exit status after Ctrl-C, as a shell would report SIGINT
const INTERRUPTED: u8 = 130;

/// Batch-convert M4A audio to MP3, keeping every file under a size limit.
#[derive(Debug, Parser)]
#[command(name = "m4a2mp3", author, version, about, max_term_width = 80)]
pub struct Opts {
    /// Directory to read source files from.
    #[arg(value_name = "INPUT_DIR", default_value = "input", conflicts_with = "single")]
    pub input_dir: PathBuf,

    /// Directory to write converted files to. Created if missing.
    #[arg(value_name = "OUTPUT_DIR", default_value = "output", conflicts_with = "single")]
    pub output_dir: PathBuf,

    /// Convert a single file. OUTPUT defaults to INPUT with the extension swapped.
    #[arg(long, num_args = 1..=2, value_names = ["INPUT", "OUTPUT"])]
    pub single: Option<Vec<PathBuf>>,

    /// Encode at this bitrate (kbps) instead of sizing it to the limit.
    #[arg(long, value_name = "KBPS")]
    pub bitrate: Option<u32>,

    /// Per-file size limit in MiB.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_size_mib: Option<u64>,

    /// Number of files to encode at once.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// How to read durations.
    #[arg(long, value_enum)]
    pub probe: Option<ProbeBackend>,

    /// Path to the ffmpeg binary.
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary.
    #[arg(long, value_name = "PATH")]
    pub ffprobe: Option<PathBuf>,

    /// Settings file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the batch report as JSON.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// List what would be converted, and at which bitrate, without encoding.
    #[arg(long)]
    pub dry_run: bool,

    /// Keep whatever a failed encode left behind.
    #[arg(long)]
    pub keep_partial: bool,

    /// More log output. Repeat for more detail.
    #[arg(long, short, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors and hide progress bars.
    #[arg(long, short)]
    pub quiet: bool,
}

impl Opts {
    /// Overlay command line flags on loaded settings
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(mib) = self.max_size_mib {
            settings.max_size_bytes =
                SizeBudget::from_mib(mib).ok_or_else(|| anyhow!("--max-size-mib is too large"))?;
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if let Some(probe) = self.probe {
            settings.probe = probe;
        }
        if let Some(path) = &self.ffmpeg {
            settings.ffmpeg_path = Some(path.clone());
        }
        if let Some(path) = &self.ffprobe {
            settings.ffprobe_path = Some(path.clone());
        }
        if self.keep_partial {
            settings.remove_partial_outputs = false;
        }
        Ok(())
    }

    /// Level for terminal logging
    pub fn terminal_level(&self, settings: &Settings) -> Result<LevelFilter> {
        Ok(match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Error,
            (false, 0) => settings.level_filter()?,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        })
    }
}

/// Exit status for a command line that did not parse
///
/// `--help` and `--version` surface as clap errors too, but are successes.
pub fn usage_exit_status(error: &clap::Error) -> u8 {
    if error.use_stderr() { 1 } else { 0 }
}

/// Run the converter
pub async fn entry(opts: &Opts) -> Result<ExitCode> {
    let mut settings =
        Settings::load(opts.config.as_deref()).context("Failed to load settings")?;
    opts.apply(&mut settings)?;
    settings.validate().context("Invalid settings")?;

    if let Some(path) = logging::init_logging(opts.terminal_level(&settings)?, settings.log_to_file) {
        log::debug!("Logging to {}", path.display());
    }
    log::debug!("Settings: {:?}", settings);

    // Warn here once; the bars are not up yet.
    if let Some(requested) = opts.bitrate {
        let bitrate = BitrateKbps::clamped(requested);
        if bitrate.kbps() != requested {
            log::warn!("--bitrate {} is out of range, using {}", requested, bitrate);
        }
    }

    let probe = match settings.probe {
        ProbeBackend::Ffprobe => {
            let program = resolve_tool("ffprobe", settings.ffprobe_path.as_deref()).ok_or_else(
                || anyhow!("ffprobe not found on PATH (use --ffprobe <PATH> or --probe native)"),
            )?;
            Probe::Ffprobe(FfprobeProbe::new(program))
        }
        ProbeBackend::Native => Probe::Native(NativeProbe),
    };

    let ffmpeg = match resolve_tool("ffmpeg", settings.ffmpeg_path.as_deref()) {
        Some(path) => path,
        None if opts.dry_run => {
            log::warn!("ffmpeg not found on PATH; a real run would fail");
            PathBuf::from("ffmpeg")
        }
        None => return Err(anyhow!("ffmpeg not found on PATH (use --ffmpeg <PATH>)")),
    };

    let encoder = FfmpegEncoder::new(ffmpeg);
    log::debug!("Using ffmpeg at {}", encoder.program().display());

    let mut options = BatchOptions::from_settings(&settings);
    options.bitrate = opts.bitrate;
    let runner = BatchRunner::new(probe, encoder, options);

    if let Some(single) = &opts.single {
        if opts.report.is_some() {
            log::warn!("--report is ignored with --single");
        }
        let input = &single[0];
        return run_single(&runner, input, single.get(1).map(PathBuf::as_path), !opts.quiet).await;
    }

    if opts.dry_run {
        let plan = runner
            .plan_batch(&opts.input_dir, &opts.output_dir)
            .await
            .with_context(|| format!("Failed to scan {}", opts.input_dir.display()))?;
        print!("{}", render_plan(&plan, settings.max_size_bytes));
        return Ok(ExitCode::SUCCESS);
    }

    run_batch(&runner, opts, settings.max_size_bytes).await
}

async fn run_single(
    runner: &BatchRunner<Probe, FfmpegEncoder>,
    input: &Path,
    output: Option<&Path>,
    show_progress: bool,
) -> Result<ExitCode> {
    let bar = single_file_bar(input, show_progress);

    let Some(outcome) = single_until(runner, input, output, &bar, ctrl_c()).await else {
        eprintln!("Interrupted");
        return Ok(ExitCode::from(INTERRUPTED));
    };

    let result = outcome.with_context(|| format!("Failed to convert {}", input.display()))?;
    println!("{}", result_line(&result));
    if result.is_over_limit() {
        log::warn!("Consider a lower --bitrate or splitting the file");
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_batch(
    runner: &BatchRunner<Probe, FfmpegEncoder>,
    opts: &Opts,
    budget: SizeBudget,
) -> Result<ExitCode> {
    let progress = BatchProgress::new(!opts.quiet);

    let outcome = batch_until(runner, &opts.input_dir, &opts.output_dir, &progress, ctrl_c()).await;
    let Some(outcome) = outcome else {
        eprintln!("Interrupted");
        return Ok(ExitCode::from(INTERRUPTED));
    };

    let report = outcome.with_context(|| {
        format!(
            "Failed to convert {} into {}",
            opts.input_dir.display(),
            opts.output_dir.display()
        )
    })?;

    print!("{}", render_summary(&report, budget));

    if let Some(path) = &opts.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }

    // Per-file failures are in the summary; the run itself succeeded.
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::debug!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Convert one file unless `interrupt` resolves first
///
/// On interrupt the output is removed only if the encoder had started
/// writing it, and `None` is returned.
async fn single_until<P, E>(
    runner: &BatchRunner<P, E>,
    input: &Path,
    output: Option<&Path>,
    bar: &ProgressBar,
    interrupt: impl Future<Output = ()>,
) -> Option<Result<ConversionResult, ConvertError>>
where
    P: DurationProbe,
    E: MediaEncoder,
{
    let writing: RefCell<Option<PathBuf>> = RefCell::new(None);
    let on_event = |event: BatchEvent<'_>| match event {
        BatchEvent::Encoding { output_path, .. } => {
            *writing.borrow_mut() = Some(output_path.to_path_buf());
        }
        BatchEvent::Progress { percent, .. } => bar.set_position(u64::from(percent)),
        BatchEvent::Started { .. } | BatchEvent::Finished { .. } => {}
    };

    let outcome = tokio::select! {
        result = runner.run_single(input, output, &on_event) => Some(result),
        _ = interrupt => None,
    };
    bar.finish_and_clear();

    // The conversion future is gone by now, and ffmpeg with it.
    if outcome.is_none()
        && let Some(path) = writing.take()
    {
        remove_partial_output(&path).await;
    }
    outcome
}

/// Run a batch unless `interrupt` resolves first
///
/// On interrupt every output the encoder was writing is removed and `None`
/// is returned.
async fn batch_until<P, E>(
    runner: &BatchRunner<P, E>,
    input_dir: &Path,
    output_dir: &Path,
    progress: &BatchProgress,
    interrupt: impl Future<Output = ()>,
) -> Option<Result<BatchReport, FilesystemError>>
where
    P: DurationProbe,
    E: MediaEncoder,
{
    let on_event = |event: BatchEvent<'_>| progress.handle(event);

    let outcome = tokio::select! {
        report = runner.run_batch_with(input_dir, output_dir, &on_event) => Some(report),
        _ = interrupt => None,
    };
    progress.finish();

    if outcome.is_none() {
        for output in progress.in_flight_outputs() {
            remove_partial_output(&output).await;
        }
    }
    outcome
}
