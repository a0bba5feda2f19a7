//! # partyq Player Library (partyq-player)
//!
//! Shared music queue for a party: users request tracks, a worker pool
//! resolves them to local audio assets, a single playback loop streams them
//! in request order, and a quorum of skip votes can cut the current track.
//! When nothing is queued an idle suggester keeps playing from the party
//! playlist.
//!
//! [`Party`] is the entry point; the modules below are its parts.

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod party;
pub mod playback;
pub mod reference;
pub mod resolver;
pub mod users;

pub use config::PlayerConfig;
pub use error::{AddTrackError, Error, ResolutionError, Result, VoteRejected};
pub use party::Party;
pub use playback::{PlaybackState, VoteOutcome};
pub use users::UserRegistry;
