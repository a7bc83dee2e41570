//! Core converter logic
//!
//! This module contains:
//! - Bitrate sizing against the per-file size budget
//! - Worklist discovery and output path derivation
//! - Converter settings

mod bitrate;
mod scanning;
mod settings;

pub use bitrate::{BitrateKbps, SizeBudget, calculate_bitrate, estimate_output_size};
pub use scanning::{
    ensure_dir, find_source_files, format_duration, format_size, output_path_in,
    sibling_output_path,
};
pub use settings::{ProbeBackend, Settings};
