//! Audio asset probing using symphonia
//!
//! Verifies that a local file is a readable audio asset (container recognised,
//! an audio track present, a decoder available for its codec) and extracts the
//! little the player needs: a title tag and the duration.

use crate::error::ResolutionError;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::debug;

/// What probing learned about an asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    /// Title tag, if the container carries one
    pub title: Option<String>,
    /// Total length, if the container declares a frame count
    pub duration: Option<Duration>,
}

/// Probe `path` and confirm it can be decoded
pub fn probe_asset(path: &Path) -> Result<AssetInfo, ResolutionError> {
    let file = File::open(path)
        .map_err(|e| ResolutionError::Io(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ResolutionError::Decode(format!("{}: {}", path.display(), e)))?;

    let (params, title_from_format) = {
        let format = &mut probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                ResolutionError::Decode(format!("{}: no audio track", path.display()))
            })?;
        let params = track.codec_params.clone();
        let title = format.metadata().current().and_then(title_tag);
        (params, title)
    };

    // Ensure the codec is one we can actually decode
    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| ResolutionError::Decode(format!("{}: {}", path.display(), e)))?;

    // ID3 and similar tags are reported by the probe rather than the format reader
    let title = title_from_format.or_else(|| {
        probed
            .metadata
            .get()
            .and_then(|m| m.current().and_then(title_tag))
    });

    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / rate as f64))
        }
        _ => None,
    };

    debug!(
        "Probed {}: title={:?}, duration={:?}",
        path.display(),
        title,
        duration
    );

    Ok(AssetInfo { title, duration })
}

fn title_tag(revision: &MetadataRevision) -> Option<String> {
    revision
        .tags()
        .iter()
        .find(|tag| tag.std_key == Some(StandardTagKey::TrackTitle))
        .map(|tag| tag.value.to_string())
        .filter(|title| !title.trim().is_empty())
}
