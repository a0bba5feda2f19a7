//! Remote media resolution through the `yt-dlp` executable
//!
//! Downloads the best audio stream, extracts it to the configured format into
//! the cache directory and reads the resulting file path and title from the
//! JSON info dump yt-dlp prints once post-processing is done.

use super::{MediaResolver, PlaylistEnumerator};
use crate::error::ResolutionError;
use partyq_common::{Track, User};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: PathBuf,
    cache_dir: PathBuf,
    audio_format: String,
}

/// Subset of the yt-dlp info dump the resolver reads
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
    filepath: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(binary: PathBuf, cache_dir: PathBuf, audio_format: String) -> Self {
        Self {
            binary,
            cache_dir,
            audio_format,
        }
    }

    fn run(&self, args: &[&str], reference: &str) -> Result<Output, ResolutionError> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg("--")
            .arg(reference)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ResolutionError::Io(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(output)
    }

    /// Pick the downloaded file: the path yt-dlp reports, else the templated name
    fn locate_asset(&self, info: &VideoInfo) -> Option<PathBuf> {
        info.requested_downloads
            .iter()
            .rev()
            .filter_map(|d| d.filepath.clone())
            .chain(std::iter::once(
                self.cache_dir.join(format!("{}.{}", info.id, self.audio_format)),
            ))
            .find(|p| p.is_file())
    }
}

impl MediaResolver for YtDlpResolver {
    fn resolve(&self, reference: &str, requester: &User) -> Result<Track, ResolutionError> {
        std::fs::create_dir_all(&self.cache_dir)?;

        info!("Downloading {} for {}", reference, requester);

        let template = self.cache_dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy().into_owned();
        let output = self.run(
            &[
                "--no-playlist",
                "--no-progress",
                "--no-simulate",
                "--dump-single-json",
                "--format",
                "m4a/bestaudio/best",
                "--extract-audio",
                "--audio-format",
                self.audio_format.as_str(),
                "--output",
                template.as_str(),
            ],
            reference,
        )?;

        let info = parse_video_info(&output.stdout)?;
        let asset_path = self.locate_asset(&info).ok_or_else(|| {
            ResolutionError::Decode(format!("no extracted audio file for {}", info.id))
        })?;
        let name = info.title.clone().unwrap_or_else(|| info.id.clone());

        debug!("Resolved {} to {}", reference, asset_path.display());
        Ok(Track::resolved(reference, asset_path, name, requester.clone()))
    }
}

impl PlaylistEnumerator for YtDlpResolver {
    fn enumerate(&self, playlist_reference: &str) -> Result<Vec<String>, ResolutionError> {
        let output = self.run(
            &["--flat-playlist", "--dump-single-json", "--no-warnings"],
            playlist_reference,
        )?;
        let references = parse_playlist_entries(&output.stdout)?;

        info!(
            "Playlist {} expanded to {} tracks",
            playlist_reference,
            references.len()
        );
        Ok(references)
    }
}

fn parse_video_info(stdout: &[u8]) -> Result<VideoInfo, ResolutionError> {
    serde_json::from_slice(stdout)
        .map_err(|e| ResolutionError::Internal(format!("unreadable yt-dlp output: {}", e)))
}

/// Extract entry URLs from a flat playlist dump, dropping unreadable entries
fn parse_playlist_entries(stdout: &[u8]) -> Result<Vec<String>, ResolutionError> {
    let dump: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ResolutionError::Internal(format!("unreadable yt-dlp output: {}", e)))?;

    let entry_url = |entry: &serde_json::Value| {
        entry
            .get("webpage_url")
            .or_else(|| entry.get("url"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let Some(entries) = dump.get("entries").and_then(|e| e.as_array()) else {
        // Not a playlist: a single video stands for itself
        return Ok(entry_url(&dump).into_iter().collect());
    };

    let mut references = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        match entry_url(entry) {
            Some(url) => references.push(url),
            None => warn!("Skipping unreadable playlist entry #{}", idx + 1),
        }
    }
    Ok(references)
}

/// Map yt-dlp's stderr onto the resolution error taxonomy
fn classify_failure(stderr: &str) -> ResolutionError {
    let detail = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("yt-dlp failed without output")
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();

    const UNSUPPORTED: &[&str] = &[
        "unsupported url",
        "is not a valid url",
        "video unavailable",
        "private video",
    ];
    const DECODE: &[&str] = &["postprocessing", "ffmpeg", "ffprobe", "audio conversion"];

    if UNSUPPORTED.iter().any(|m| lower.contains(m)) {
        ResolutionError::Unsupported(detail)
    } else if DECODE.iter().any(|m| lower.contains(m)) {
        ResolutionError::Decode(detail)
    } else {
        ResolutionError::Network(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unsupported() {
        let err = classify_failure("ERROR: Unsupported URL: https://example.com/not-a-video\n");
        assert_eq!(
            err,
            ResolutionError::Unsupported(
                "ERROR: Unsupported URL: https://example.com/not-a-video".to_string()
            )
        );
    }

    #[test]
    fn test_classify_postprocessing_as_decode() {
        let err = classify_failure(
            "[ExtractAudio] Destination: x.mp3\nERROR: Postprocessing: audio conversion failed\n",
        );
        assert!(matches!(err, ResolutionError::Decode(_)));
    }

    #[test]
    fn test_classify_http_error_as_network() {
        let err = classify_failure(
            "WARNING: retrying\nERROR: unable to download video data: HTTP Error 403: Forbidden\n",
        );
        assert!(matches!(err, ResolutionError::Network(ref d) if d.contains("403")));
    }

    #[test]
    fn test_parse_video_info_prefers_reported_path() {
        let json = br#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "requested_downloads": [{"filepath": "/cache/dQw4w9WgXcQ.mp3"}]
        }"#;

        let info = parse_video_info(json).unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(
            info.requested_downloads[0].filepath,
            Some(PathBuf::from("/cache/dQw4w9WgXcQ.mp3"))
        );
    }

    #[test]
    fn test_locate_asset_falls_back_to_template() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = YtDlpResolver::new(
            PathBuf::from("yt-dlp"),
            dir.path().to_path_buf(),
            "mp3".to_string(),
        );
        std::fs::write(dir.path().join("abc123.mp3"), b"x").unwrap();

        let info = VideoInfo {
            id: "abc123".to_string(),
            title: None,
            requested_downloads: vec![RequestedDownload {
                filepath: Some(dir.path().join("abc123.webm")),
            }],
        };

        assert_eq!(resolver.locate_asset(&info), Some(dir.path().join("abc123.mp3")));
    }

    #[test]
    fn test_playlist_entries_skip_unreadable() {
        let json = br#"{
            "_type": "playlist",
            "entries": [
                {"url": "https://www.youtube.com/watch?v=one"},
                null,
                {"title": "deleted video"},
                {"webpage_url": "https://www.youtube.com/watch?v=two", "url": "two"}
            ]
        }"#;

        let refs = parse_playlist_entries(json).unwrap();
        assert_eq!(
            refs,
            vec![
                "https://www.youtube.com/watch?v=one".to_string(),
                "https://www.youtube.com/watch?v=two".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_video_enumerates_to_itself() {
        let json = br#"{"id": "x", "webpage_url": "https://www.youtube.com/watch?v=x"}"#;
        assert_eq!(
            parse_playlist_entries(json).unwrap(),
            vec!["https://www.youtube.com/watch?v=x".to_string()]
        );
    }

    #[test]
    fn test_missing_binary_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = YtDlpResolver::new(
            dir.path().join("no-such-yt-dlp"),
            dir.path().join("cache"),
            "mp3".to_string(),
        );

        let result = resolver.resolve("https://youtu.be/abc", &User::default());
        assert!(matches!(result, Err(ResolutionError::Io(_))));
    }
}
