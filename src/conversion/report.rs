//! Per-file results and the batch report

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{BitrateKbps, SizeBudget};

/// Whether an output fits its size budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeStatus {
    Ok,
    OverLimit,
}

impl SizeStatus {
    /// `OverLimit` only when the output is strictly larger than the budget
    pub fn for_size(size_bytes: u64, budget: SizeBudget) -> Self {
        if budget.is_exceeded_by(size_bytes) {
            SizeStatus::OverLimit
        } else {
            SizeStatus::Ok
        }
    }
}

/// A successfully encoded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub bitrate: BitrateKbps,
    pub duration_seconds: f64,
    pub status: SizeStatus,
}

impl ConversionResult {
    /// Space saved relative to the input, in percent
    ///
    /// Negative when the output grew. `None` for an empty input.
    pub fn compression_ratio(&self) -> Option<f64> {
        if self.input_size_bytes == 0 {
            return None;
        }
        Some((1.0 - self.output_size_bytes as f64 / self.input_size_bytes as f64) * 100.0)
    }

    pub fn is_over_limit(&self) -> bool {
        self.status == SizeStatus::OverLimit
    }
}

/// A file that could not be converted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedConversion {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub reason: String,
}

/// Outcome of a whole batch, in worklist order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ConversionResult>,
    pub failures: Vec<FailedConversion>,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl BatchReport {
    pub fn new(total_count: usize) -> Self {
        Self {
            results: Vec::with_capacity(total_count),
            failures: Vec::new(),
            success_count: 0,
            failed_count: 0,
            total_count,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    pub fn record_success(&mut self, result: ConversionResult) {
        self.success_count += 1;
        self.results.push(result);
    }

    pub fn record_failure(&mut self, failure: FailedConversion) {
        self.failed_count += 1;
        self.failures.push(failure);
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn total_input_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.input_size_bytes).sum()
    }

    pub fn total_output_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.output_size_bytes).sum()
    }

    pub fn over_limit_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_over_limit()).count()
    }

    /// Wall-clock time between start and finish
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}
