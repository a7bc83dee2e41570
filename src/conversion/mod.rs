//! Audio conversion module
//!
//! Transcodes source files to MP3 with ffmpeg, one job per file, and
//! aggregates the outcomes of a batch.

mod batch;
mod ffmpeg;
mod job;
mod report;

pub use batch::{
    BatchEvent, BatchOptions, BatchRunner, PlannedConversion, SizeEstimate, remove_partial_output,
};
pub use ffmpeg::{EncodeSpec, FfmpegEncoder, MediaEncoder, OUTPUT_FORMAT};
pub use job::{ConversionRequest, EncodeJob, resolve_bitrate};
pub use report::{BatchReport, ConversionResult, FailedConversion, SizeStatus};
