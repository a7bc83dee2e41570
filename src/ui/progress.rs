//! Terminal progress bars for a running batch

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::conversion::{BatchEvent, ConversionResult};
use crate::error::ConvertError;
use crate::core::format_size;

fn file_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>7} {bar:30.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One-line outcome for a converted file
pub fn result_line(result: &ConversionResult) -> String {
    let status = if result.is_over_limit() {
        "OVER LIMIT"
    } else {
        "OK"
    };
    format!(
        "{}: {} ({}) {}",
        display_name(&result.output_path),
        format_size(result.output_size_bytes),
        result.bitrate,
        status
    )
}

/// Line printed above the bars when a file is done
fn finished_line(input_path: &Path, outcome: &Result<ConversionResult, ConvertError>) -> String {
    match outcome {
        Ok(result) => format!("✓ {}", result_line(result)),
        Err(e) => format!("✗ {}: {}", display_name(input_path), e),
    }
}

/// Renders [`BatchEvent`]s as one bar per file in flight plus an overall bar
///
/// Also remembers which outputs the encoder is writing, so an interrupted
/// batch can clean them up. A file still being probed has written nothing
/// and is not listed.
pub struct BatchProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: RefCell<HashMap<usize, ProgressBar>>,
    in_flight: RefCell<HashMap<usize, PathBuf>>,
}

impl BatchProgress {
    /// `visible == false` tracks state without drawing anything
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(overall_style());

        Self {
            multi,
            overall,
            bars: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(HashMap::new()),
        }
    }

    pub fn handle(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::Started {
                index,
                total,
                input_path,
                ..
            } => {
                self.overall.set_length(total as u64);

                let bar = self.multi.insert_before(&self.overall, ProgressBar::new(100));
                bar.set_style(file_style());
                bar.set_prefix(format!("{}/{}", index + 1, total));
                bar.set_message(display_name(input_path));
                self.bars.borrow_mut().insert(index, bar);
            }
            BatchEvent::Encoding { index, output_path } => {
                self.in_flight
                    .borrow_mut()
                    .insert(index, output_path.to_path_buf());
            }
            BatchEvent::Progress { index, percent } => {
                if let Some(bar) = self.bars.borrow().get(&index) {
                    bar.set_position(u64::from(percent));
                }
            }
            BatchEvent::Finished {
                index,
                input_path,
                outcome,
            } => {
                self.in_flight.borrow_mut().remove(&index);
                if let Some(bar) = self.bars.borrow_mut().remove(&index) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                self.overall.inc(1);

                let _ = self.multi.println(finished_line(input_path, outcome));
            }
        }
    }

    /// Output paths the encoder started writing and has not finished
    pub fn in_flight_outputs(&self) -> Vec<PathBuf> {
        let mut outputs: Vec<(usize, PathBuf)> = self
            .in_flight
            .borrow()
            .iter()
            .map(|(index, path)| (*index, path.clone()))
            .collect();
        outputs.sort_by_key(|(index, _)| *index);
        outputs.into_iter().map(|(_, path)| path).collect()
    }

    pub fn finish(&self) {
        for (_, bar) in self.bars.borrow_mut().drain() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
    }
}

/// Single bar for `--single` mode
pub fn single_file_bar(input: &Path, visible: bool) -> ProgressBar {
    let bar = if visible {
        ProgressBar::new(100)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(file_style());
    bar.set_prefix("1/1");
    bar.set_message(display_name(input));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::SizeStatus;
    use crate::core::BitrateKbps;
    use crate::error::EncodeError;

    fn result(status: SizeStatus) -> ConversionResult {
        ConversionResult {
            input_path: PathBuf::from("/in/song.m4a"),
            output_path: PathBuf::from("/out/song.mp3"),
            input_size_bytes: 10 * 1024 * 1024,
            output_size_bytes: 5 * 1024 * 1024,
            bitrate: BitrateKbps::clamped(223),
            duration_seconds: 600.0,
            status,
        }
    }

    #[test]
    fn test_result_line() {
        assert_eq!(result_line(&result(SizeStatus::Ok)), "song.mp3: 5.00 MB (223 kbps) OK");
        assert_eq!(
            result_line(&result(SizeStatus::OverLimit)),
            "song.mp3: 5.00 MB (223 kbps) OVER LIMIT"
        );
    }

    #[test]
    fn test_failure_line_names_the_file() {
        let outcome: Result<ConversionResult, ConvertError> =
            Err(EncodeError::failed("ffmpeg exited with status 1: Invalid data").into());
        assert_eq!(
            finished_line(Path::new("/in/broken.m4a"), &outcome),
            "✗ broken.m4a: encode failed: ffmpeg exited with status 1: Invalid data"
        );

        let outcome = Ok(result(SizeStatus::OverLimit));
        assert_eq!(
            finished_line(Path::new("/in/song.m4a"), &outcome),
            "✓ song.mp3: 5.00 MB (223 kbps) OVER LIMIT"
        );
    }

    #[test]
    fn test_tracks_only_outputs_being_encoded() {
        let progress = BatchProgress::new(false);
        let a_in = PathBuf::from("/in/a.m4a");
        let a_out = PathBuf::from("/out/a.mp3");
        let b_in = PathBuf::from("/in/b.m4a");
        let b_out = PathBuf::from("/out/b.mp3");

        progress.handle(BatchEvent::Started {
            index: 1,
            total: 2,
            input_path: &b_in,
            output_path: &b_out,
        });
        progress.handle(BatchEvent::Started {
            index: 0,
            total: 2,
            input_path: &a_in,
            output_path: &a_out,
        });
        // Both are still probing.
        assert!(progress.in_flight_outputs().is_empty());

        progress.handle(BatchEvent::Encoding {
            index: 1,
            output_path: &b_out,
        });
        progress.handle(BatchEvent::Encoding {
            index: 0,
            output_path: &a_out,
        });
        progress.handle(BatchEvent::Progress {
            index: 0,
            percent: 40,
        });
        assert_eq!(progress.in_flight_outputs(), vec![a_out.clone(), b_out.clone()]);

        let outcome: Result<ConversionResult, ConvertError> =
            Err(EncodeError::failed("boom").into());
        progress.handle(BatchEvent::Finished {
            index: 1,
            input_path: &b_in,
            outcome: &outcome,
        });
        assert_eq!(progress.in_flight_outputs(), vec![a_out]);

        let outcome = Ok(result(SizeStatus::Ok));
        progress.handle(BatchEvent::Finished {
            index: 0,
            input_path: &a_in,
            outcome: &outcome,
        });
        assert!(progress.in_flight_outputs().is_empty());
        progress.finish();
    }
}
