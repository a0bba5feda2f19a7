//! Media resolution
//!
//! A resolver turns a source reference (URL or local path) plus the requesting
//! user into a playable [`Track`], or a typed [`ResolutionError`]. Resolvers
//! hold no shared pipeline state; the worker pool calls them concurrently.

pub mod local;
pub mod ytdlp;

pub use local::LocalFileResolver;
pub use ytdlp::YtDlpResolver;

use crate::config::{PlayerConfig, ResolverKind};
use crate::error::ResolutionError;
use partyq_common::{Track, User};
use std::sync::Arc;

/// Turns a reference into a locally available track
pub trait MediaResolver: Send + Sync {
    fn resolve(&self, reference: &str, requester: &User) -> Result<Track, ResolutionError>;
}

/// Expands a playlist reference into individual track references
///
/// Entries that cannot be read are skipped; only a failure to read the
/// playlist itself is an error.
pub trait PlaylistEnumerator: Send + Sync {
    fn enumerate(&self, playlist_reference: &str) -> Result<Vec<String>, ResolutionError>;
}

/// Routes local references to the file resolver and everything else to yt-dlp
pub struct AutoResolver {
    local: LocalFileResolver,
    remote: YtDlpResolver,
}

impl AutoResolver {
    pub fn new(local: LocalFileResolver, remote: YtDlpResolver) -> Self {
        Self { local, remote }
    }
}

impl MediaResolver for AutoResolver {
    fn resolve(&self, reference: &str, requester: &User) -> Result<Track, ResolutionError> {
        if LocalFileResolver::handles(reference) {
            self.local.resolve(reference, requester)
        } else {
            self.remote.resolve(reference, requester)
        }
    }
}

/// Build the resolver and playlist enumerator selected by the config
pub fn from_config(
    config: &PlayerConfig,
) -> (Arc<dyn MediaResolver>, Arc<dyn PlaylistEnumerator>) {
    let ytdlp = YtDlpResolver::new(
        config.resolver.ytdlp_binary.clone(),
        config.cache_dir.clone(),
        config.resolver.audio_format.clone(),
    );

    let resolver: Arc<dyn MediaResolver> = match config.resolver.kind {
        ResolverKind::Auto => Arc::new(AutoResolver::new(LocalFileResolver::new(), ytdlp.clone())),
        ResolverKind::YtDlp => Arc::new(ytdlp.clone()),
        ResolverKind::Local => Arc::new(LocalFileResolver::new()),
    };

    // Party playlists are always remote
    (resolver, Arc::new(ytdlp))
}
