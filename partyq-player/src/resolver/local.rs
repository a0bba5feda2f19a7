//! Resolver for assets already on local disk
//!
//! Accepts plain paths and `file://` references. Nothing is fetched; the file
//! is probed so an unreadable asset fails at request time instead of
//! silently being skipped by the playback loop later.

use super::MediaResolver;
use crate::audio::probe::probe_asset;
use crate::error::ResolutionError;
use partyq_common::{Track, User};
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone, Default)]
pub struct LocalFileResolver;

impl LocalFileResolver {
    pub fn new() -> Self {
        Self
    }

    /// True for references this resolver understands (no network scheme)
    pub fn handles(reference: &str) -> bool {
        reference.starts_with(FILE_SCHEME) || !reference.contains("://")
    }

    fn to_path(reference: &str) -> PathBuf {
        PathBuf::from(reference.strip_prefix(FILE_SCHEME).unwrap_or(reference))
    }

    fn fallback_name(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

impl MediaResolver for LocalFileResolver {
    fn resolve(&self, reference: &str, requester: &User) -> Result<Track, ResolutionError> {
        if !Self::handles(reference) {
            return Err(ResolutionError::Unsupported(reference.to_string()));
        }

        let path = Self::to_path(reference);
        if !path.is_file() {
            return Err(ResolutionError::Unsupported(format!(
                "no such file: {}",
                path.display()
            )));
        }

        let info = probe_asset(&path)?;
        let name = info.title.unwrap_or_else(|| Self::fallback_name(&path));
        let asset_path = path.canonicalize().unwrap_or(path);

        Ok(Track::resolved(reference, asset_path, name, requester.clone()))
    }
}
