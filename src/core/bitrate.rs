//! Bitrate sizing for the per-file size ceiling
//!
//! A constant-bitrate MP3 weighs roughly `bitrate_kbps * duration_s * 1000 / 8`
//! bytes. Inverting that gives the highest bitrate that still fits a file
//! into its [`SizeBudget`], which is then clamped to what MP3 can sensibly
//! carry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default per-file ceiling (16 MiB)
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 16 * 1024 * 1024;

/// Maximum MP3 bitrate (kbps)
pub const MAX_BITRATE: u32 = 320;

/// Minimum MP3 bitrate (kbps), the quality floor
pub const MIN_BITRATE: u32 = 64;

/// Byte ceiling for one output file. Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct SizeBudget(u64);

impl SizeBudget {
    /// Returns `None` for a zero budget.
    pub fn new(bytes: u64) -> Option<Self> {
        (bytes > 0).then_some(Self(bytes))
    }

    /// Budget expressed in mebibytes.
    pub fn from_mib(mib: u64) -> Option<Self> {
        mib.checked_mul(1024 * 1024).and_then(Self::new)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Whether a file of `size` bytes exceeds this budget.
    pub fn is_exceeded_by(self, size: u64) -> bool {
        size > self.0
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self(DEFAULT_MAX_SIZE_BYTES)
    }
}

impl TryFrom<u64> for SizeBudget {
    type Error = String;

    fn try_from(bytes: u64) -> Result<Self, Self::Error> {
        Self::new(bytes).ok_or_else(|| "size budget must be greater than zero".to_string())
    }
}

impl From<SizeBudget> for u64 {
    fn from(budget: SizeBudget) -> Self {
        budget.0
    }
}

/// Encoding bitrate in kbps, always within [`MIN_BITRATE`, `MAX_BITRATE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct BitrateKbps(u32);

impl BitrateKbps {
    /// Clamp an arbitrary kbps value into the supported range.
    pub fn clamped(kbps: u32) -> Self {
        Self(kbps.clamp(MIN_BITRATE, MAX_BITRATE))
    }

    pub fn kbps(self) -> u32 {
        self.0
    }
}

impl From<u32> for BitrateKbps {
    fn from(kbps: u32) -> Self {
        Self::clamped(kbps)
    }
}

impl From<BitrateKbps> for u32 {
    fn from(bitrate: BitrateKbps) -> Self {
        bitrate.0
    }
}

impl fmt::Display for BitrateKbps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.0)
    }
}

/// Calculate the bitrate that keeps a file of `duration_seconds` under `budget`
///
/// bitrate (kbps) = floor(size_bytes * 8 / (duration_seconds * 1000)),
/// clamped into [64, 320]. Durations that are zero, negative or not finite
/// are treated as vanishingly short and get the ceiling.
pub fn calculate_bitrate(duration_seconds: f64, budget: SizeBudget) -> BitrateKbps {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return BitrateKbps(MAX_BITRATE);
    }

    let raw = (budget.bytes() as f64 * 8.0 / (duration_seconds * 1000.0)).floor();

    // `as` saturates, so absurdly short durations land on u32::MAX and clamp.
    BitrateKbps::clamped(raw as u32)
}

/// Estimated CBR output size in bytes for a bitrate and duration
pub fn estimate_output_size(bitrate: BitrateKbps, duration_seconds: f64) -> u64 {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return 0;
    }
    // kbps * 1000 / 8 = 125 bytes per second per kbps
    (bitrate.kbps() as f64 * duration_seconds * 125.0) as u64
}
