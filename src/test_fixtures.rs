//! Test fixtures for conversion tests
//!
//! Scripted stand-ins for the probe and the encoder, so jobs and batches can
//! be exercised without ffmpeg on the machine.

#![cfg(test)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::audio::DurationProbe;
use crate::conversion::{EncodeSpec, MediaEncoder};
use crate::error::{EncodeError, ProbeError};

/// Create input files with a little content in `dir`
pub fn write_inputs(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, format!("fake audio for {}", name))
                .expect("Failed to write test input");
            path
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Probe that answers from a script keyed by file name
pub struct FakeProbe {
    default_seconds: f64,
    durations: HashMap<String, f64>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl FakeProbe {
    pub fn new(default_seconds: f64) -> Self {
        Self {
            default_seconds,
            durations: HashMap::new(),
            failing: HashSet::new(),
            delays: HashMap::new(),
        }
    }

    /// Hold the probe of one input for a while
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn with_duration(mut self, name: &str, seconds: f64) -> Self {
        self.durations.insert(name.to_string(), seconds);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl DurationProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        let name = file_name(path);
        if let Some(delay) = self.delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&name) {
            return Err(ProbeError::InvalidMedia {
                path: path.to_path_buf(),
                message: "simulated probe failure".to_string(),
            });
        }
        Ok(self
            .durations
            .get(&name)
            .copied()
            .unwrap_or(self.default_seconds))
    }
}

/// Encoder that writes a fixed number of bytes instead of encoding
pub struct FakeEncoder {
    output_bytes: u64,
    sizes: HashMap<String, u64>,
    failing: HashSet<String>,
    progress: Vec<f64>,
    delays: HashMap<String, Duration>,
    write_output: bool,
    calls: Mutex<Vec<EncodeSpec>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEncoder {
    pub fn new(output_bytes: u64) -> Self {
        Self {
            output_bytes,
            sizes: HashMap::new(),
            failing: HashSet::new(),
            progress: Vec::new(),
            delays: HashMap::new(),
            write_output: true,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Progress percentages to emit for every file
    pub fn with_progress(mut self, percents: &[f64]) -> Self {
        self.progress = percents.to_vec();
        self
    }

    /// Output size for one input, by input file name
    pub fn with_output_size(mut self, name: &str, bytes: u64) -> Self {
        self.sizes.insert(name.to_string(), bytes);
        self
    }

    /// Hold the encode of one input for a while
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Fail this input after writing a partial output
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Succeed without producing an output file
    pub fn writing_nothing(mut self) -> Self {
        self.write_output = false;
        self
    }

    pub fn calls(&self) -> Vec<EncodeSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl MediaEncoder for FakeEncoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError> {
        self.calls.lock().unwrap().push(spec.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let name = file_name(&spec.input_path);
        if let Some(delay) = self.delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }

        let result = if self.failing.contains(&name) {
            tokio::fs::write(&spec.output_path, b"partial").await.unwrap();
            Err(EncodeError::failed(format!("simulated encoder failure on {}", name)))
        } else {
            for percent in &self.progress {
                on_progress(*percent);
            }
            if self.write_output {
                let bytes = self.sizes.get(&name).copied().unwrap_or(self.output_bytes);
                tokio::fs::write(&spec.output_path, vec![0u8; bytes as usize])
                    .await
                    .unwrap();
            }
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
