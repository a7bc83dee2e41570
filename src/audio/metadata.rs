use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lofty::AudioFile;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::probe::DurationProbe;
use crate::error::ProbeError;

/// In-process duration probe
///
/// Uses symphonia's frame count first. AAC in MP4 often does not advertise
/// one, so lofty's container properties are the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl DurationProbe for NativeProbe {
    async fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_duration(&owned))
            .await
            .map_err(|e| ProbeError::InvalidMedia {
                path: path.to_path_buf(),
                message: format!("probe task failed: {}", e),
            })?
    }
}

/// Read the playback duration of an audio file in seconds
pub fn read_duration(path: &Path) -> Result<f64, ProbeError> {
    let file = File::open(path).map_err(|source| ProbeError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let symphonia_error = match symphonia_duration(path, file) {
        Ok(Some(duration)) => {
            log::debug!("{}: {:.2}s (symphonia)", path.display(), duration);
            return Ok(duration);
        }
        Ok(None) => None,
        Err(message) => Some(message),
    };

    match lofty_duration(path) {
        Ok(Some(duration)) => {
            log::debug!("{}: {:.2}s (lofty)", path.display(), duration);
            Ok(duration)
        }
        Ok(None) => Err(ProbeError::NoDuration {
            path: path.to_path_buf(),
        }),
        Err(lofty_error) => Err(ProbeError::InvalidMedia {
            path: path.to_path_buf(),
            message: symphonia_error.unwrap_or(lofty_error),
        }),
    }
}

/// Duration from the default track's frame count, if advertised
fn symphonia_duration(path: &Path, file: File) -> Result<Option<f64>, String> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| format!("Failed to probe audio format: {}", e))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| "No default track found".to_string())?;

    let params = &track.codec_params;
    let duration = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(n_frames), Some(time_base), _) => {
            let time = time_base.calc_time(n_frames);
            Some(time.seconds as f64 + time.frac)
        }
        (Some(n_frames), None, Some(sample_rate)) if sample_rate > 0 => {
            Some(n_frames as f64 / sample_rate as f64)
        }
        _ => None,
    };

    Ok(duration.filter(|d| d.is_finite() && *d > 0.0))
}

/// Duration from the container properties
fn lofty_duration(path: &Path) -> Result<Option<f64>, String> {
    let tagged = lofty::read_from_path(path).map_err(|e| format!("Failed to read file: {}", e))?;
    let duration = tagged.properties().duration();

    Ok((duration > Duration::ZERO).then(|| duration.as_secs_f64()))
}
