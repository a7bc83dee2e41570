//! Plain-text batch summary and dry-run listing

use std::fmt::Write;
use std::path::Path;

use super::progress::result_line;
use crate::conversion::{BatchReport, PlannedConversion};
use crate::core::{SizeBudget, format_duration, format_size};

const RULE_WIDTH: usize = 60;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Summary printed after a batch
pub fn render_summary(report: &BatchReport, budget: SizeBudget) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "CONVERSION SUMMARY");
    let _ = writeln!(out, "{}", rule);

    if report.success_count > 0 {
        let _ = writeln!(out, "Successfully converted: {} file(s)", report.success_count);
        for result in &report.results {
            match result.compression_ratio() {
                Some(saved) => {
                    let _ = writeln!(out, "  {}, {:.1}% smaller", result_line(result), saved);
                }
                None => {
                    let _ = writeln!(out, "  {}", result_line(result));
                }
            }
        }
    } else {
        let _ = writeln!(out, "No files were successfully converted.");
    }

    if report.failed_count > 0 {
        let _ = writeln!(out, "Failed conversions: {} file(s)", report.failed_count);
        for failure in &report.failures {
            let _ = writeln!(out, "  {}: {}", file_name(&failure.input_path), failure.reason);
        }
    }

    let over_limit = report.over_limit_count();
    if over_limit > 0 {
        let _ = writeln!(
            out,
            "{} file(s) exceed the {} limit",
            over_limit,
            format_size(budget.bytes())
        );
    }

    let input_bytes = report.total_input_bytes();
    let output_bytes = report.total_output_bytes();
    if input_bytes > 0 {
        let saved = (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0;
        let _ = writeln!(
            out,
            "Size: {} -> {} ({:.1}% saved)",
            format_size(input_bytes),
            format_size(output_bytes),
            saved
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Total files: {}", report.total_count);
    let _ = writeln!(out, "Successful: {}", report.success_count);
    if report.failed_count > 0 {
        let _ = writeln!(out, "Failed: {}", report.failed_count);
    }
    if let Some(elapsed) = report.elapsed() {
        let _ = writeln!(
            out,
            "Elapsed: {}",
            format_duration(elapsed.num_milliseconds() as f64 / 1000.0)
        );
    }

    out
}

/// Dry-run table: what each file would be encoded at
pub fn render_plan(plan: &[PlannedConversion], budget: SizeBudget) -> String {
    let mut out = String::new();

    if plan.is_empty() {
        let _ = writeln!(out, "No files to convert.");
        return out;
    }

    let _ = writeln!(out, "Found {} file(s), limit {} each:", plan.len(), format_size(budget.bytes()));
    let _ = writeln!(
        out,
        "{:>3}  {:<32} {:>8} {:>9} {:>10}",
        "#", "File", "Length", "Bitrate", "Estimate"
    );

    let mut estimated_total = 0u64;
    for (index, entry) in plan.iter().enumerate() {
        let name = file_name(&entry.input_path);
        match &entry.estimate {
            Ok(estimate) => {
                estimated_total += estimate.estimated_size_bytes;
                let _ = writeln!(
                    out,
                    "{:>3}. {:<32} {:>8} {:>9} {:>10}",
                    index + 1,
                    name,
                    format_duration(estimate.duration_seconds),
                    estimate.bitrate.to_string(),
                    format_size(estimate.estimated_size_bytes)
                );
            }
            Err(e) => {
                let _ = writeln!(out, "{:>3}. {:<32} unreadable: {}", index + 1, name, e);
            }
        }
    }

    let _ = writeln!(out, "Estimated output: {}", format_size(estimated_total));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{ConversionResult, FailedConversion, SizeEstimate, SizeStatus};
    use crate::core::BitrateKbps;
    use crate::error::ProbeError;
    use std::path::PathBuf;

    const MIB: u64 = 1024 * 1024;

    fn report() -> BatchReport {
        let mut report = BatchReport::new(3);
        report.record_success(ConversionResult {
            input_path: PathBuf::from("/in/one.m4a"),
            output_path: PathBuf::from("/out/one.mp3"),
            input_size_bytes: 20 * MIB,
            output_size_bytes: 8 * MIB,
            bitrate: BitrateKbps::clamped(223),
            duration_seconds: 600.0,
            status: SizeStatus::Ok,
        });
        report.record_failure(FailedConversion {
            input_path: PathBuf::from("/in/two.m4a"),
            output_path: PathBuf::from("/out/two.mp3"),
            reason: "probe failed: no usable duration for /in/two.m4a".to_string(),
        });
        report.record_success(ConversionResult {
            input_path: PathBuf::from("/in/three.m4a"),
            output_path: PathBuf::from("/out/three.mp3"),
            input_size_bytes: 20 * MIB,
            output_size_bytes: 17 * MIB,
            bitrate: BitrateKbps::clamped(64),
            duration_seconds: 3600.0,
            status: SizeStatus::OverLimit,
        });
        report.finish();
        report
    }

    #[test]
    fn test_summary_lists_results_and_failures() {
        let text = render_summary(&report(), SizeBudget::default());

        assert!(text.contains("CONVERSION SUMMARY"));
        assert!(text.contains("Successfully converted: 2 file(s)"));
        assert!(text.contains("  one.mp3: 8.00 MB (223 kbps) OK, 60.0% smaller"));
        assert!(text.contains("  three.mp3: 17.00 MB (64 kbps) OVER LIMIT, 15.0% smaller"));
        assert!(text.contains("Failed conversions: 1 file(s)"));
        assert!(text.contains("  two.m4a: probe failed"));
        assert!(text.contains("1 file(s) exceed the 16.00 MB limit"));
        assert!(text.contains("Size: 40.00 MB -> 25.00 MB (37.5% saved)"));
        assert!(text.contains("Total files: 3"));
        assert!(text.contains("Successful: 2"));
        assert!(text.contains("Failed: 1"));
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let mut report = BatchReport::new(0);
        report.finish();
        let text = render_summary(&report, SizeBudget::default());

        assert!(text.contains("No files were successfully converted."));
        assert!(text.contains("Total files: 0"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn test_plan_table() {
        let plan = vec![
            PlannedConversion {
                input_path: PathBuf::from("/in/long.m4a"),
                output_path: PathBuf::from("/out/long.mp3"),
                estimate: Ok(SizeEstimate {
                    duration_seconds: 600.0,
                    bitrate: BitrateKbps::clamped(223),
                    estimated_size_bytes: 223 * 600 * 125,
                }),
            },
            PlannedConversion {
                input_path: PathBuf::from("/in/bad.m4a"),
                output_path: PathBuf::from("/out/bad.mp3"),
                estimate: Err(ProbeError::NoDuration {
                    path: PathBuf::from("/in/bad.m4a"),
                }),
            },
        ];

        let text = render_plan(&plan, SizeBudget::default());
        assert!(text.contains("Found 2 file(s), limit 16.00 MB each:"));
        assert!(text.contains("long.m4a"));
        assert!(text.contains("10:00"));
        assert!(text.contains("223 kbps"));
        assert!(text.contains("15.95 MB"));
        assert!(text.contains("bad.m4a"));
        assert!(text.contains("unreadable: no usable duration"));
        assert!(text.contains("Estimated output: 15.95 MB"));
    }

    #[test]
    fn test_empty_plan() {
        assert_eq!(render_plan(&[], SizeBudget::default()), "No files to convert.\n");
    }
}
