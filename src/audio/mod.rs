// Audio module - source file detection and duration probing

pub mod detection;
pub mod metadata;
pub mod probe;

pub use detection::has_extension;
pub use metadata::NativeProbe;
pub use probe::{DurationProbe, FfprobeProbe, Probe};
