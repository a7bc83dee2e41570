//! Error types for probing, encoding and filesystem work.
//!
//! Every per-file failure ends up as a [`ConvertError`]; the batch runner
//! records it against the file and moves on. Only the initial directory work
//! surfaces as a bare [`FilesystemError`] to the caller.

use std::path::PathBuf;

/// Duration lookup failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The probe tool could not be located.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The probe subprocess could not be spawned or awaited.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The probe subprocess exited with a failure.
    #[error("{tool} failed on {}: {message}", path.display())]
    ToolFailed {
        tool: String,
        path: PathBuf,
        message: String,
    },

    /// The input could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input is not a media container we can read.
    #[error("not a readable media file: {}: {message}", path.display())]
    InvalidMedia { path: PathBuf, message: String },

    /// The probe produced output we could not interpret.
    #[error("failed to parse probe output for {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The container does not advertise a usable duration.
    #[error("no usable duration for {}", path.display())]
    NoDuration { path: PathBuf },
}

/// The encoder reported a failure.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The encoder tool could not be located.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The encoder could not be spawned or awaited.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder ran but reported an error.
    #[error("{reason}")]
    Failed { reason: String },
}

impl EncodeError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Directory listing, creation or stat failed.
#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure that ends the conversion of a single file.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Another input of the same batch already claimed this output path.
    #[error("{} would overwrite the output of {}", output_path.display(), claimed_by.display())]
    OutputCollision {
        output_path: PathBuf,
        claimed_by: PathBuf,
    },
}

/// Settings could not be loaded or are invalid.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}
