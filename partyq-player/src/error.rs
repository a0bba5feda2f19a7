//! Error types for partyq-player
//!
//! `Error` covers component lifecycle and infrastructure failures. Failures a
//! caller is expected to handle as ordinary outcomes (a reference that does not
//! resolve, a throttled request, a rejected vote) have their own value types so
//! they never travel through `?` by accident.

use partyq_common::User;
use thiserror::Error;

/// Main error type for partyq-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Component used after shutdown
    #[error("{0} is shut down")]
    ShutDown(&'static str),

    /// Playback backend could not start or stop a stream
    #[error("Playback backend error: {0}")]
    Backend(String),

    /// Party playlist could not be enumerated at all
    #[error("Playlist error: {0}")]
    Playlist(#[from] ResolutionError),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<partyq_common::Error> for Error {
    fn from(err: partyq_common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Convenience Result type using partyq-player Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why a reference could not be turned into a track
///
/// Produced per request by a resolver and handed back to the requester as a
/// value; never fatal to the worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Fetching the media failed (connectivity, HTTP errors, geo blocks)
    #[error("network failure: {0}")]
    Network(String),

    /// The reference does not point at anything the resolver handles
    #[error("unsupported reference: {0}")]
    Unsupported(String),

    /// The media was fetched but is not a readable audio asset
    #[error("decode failure: {0}")]
    Decode(String),

    /// Local filesystem or helper process failure
    #[error("I/O failure: {0}")]
    Io(String),

    /// Resolver misbehaved (panicked or produced garbage)
    #[error("internal resolver failure: {0}")]
    Internal(String),

    /// The worker pool stopped before the request ran
    #[error("resolver pool is shutting down")]
    PoolShutdown,
}

impl From<std::io::Error> for ResolutionError {
    fn from(err: std::io::Error) -> Self {
        ResolutionError::Io(err.to_string())
    }
}

/// Structured rejection of an `add_track` request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddTrackError {
    /// Requester is banned from the party
    #[error("user {0} is banned, track not added")]
    Banned(User),

    /// Requester already has `limit` tracks queued or resolving
    #[error("too many tracks in queue ({queued}/{limit}), try again once some have played")]
    DuplicateRequestThrottled { queued: usize, limit: usize },

    /// Reference rejected before it reached the pipeline
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Resolution ran and failed
    #[error("could not resolve track: {0}")]
    ResolutionFailed(#[from] ResolutionError),
}

/// Why a skip vote was not counted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteRejected {
    #[error("user {0} is not registered")]
    NotRegistered(User),

    #[error("user {0} is banned")]
    Banned(User),
}
