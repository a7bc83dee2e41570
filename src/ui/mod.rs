//! UI module - terminal output
//!
//! - `progress` - indicatif bars driven by batch events
//! - `summary` - end-of-batch summary and dry-run listing

pub mod progress;
pub mod summary;

pub use progress::{BatchProgress, result_line, single_file_bar};
pub use summary::{render_plan, render_summary};
