//! Party event types and broadcast bus
//!
//! Every state transition of the party pipeline is published as a
//! [`PartyEvent`]. Collaborators (chat bots, web front-ends, the end-of-party
//! summary fan-out) subscribe to the [`EventBus`] instead of polling.

use crate::models::{Track, User};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Party event types
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag for
/// transmission to external listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PartyEvent {
    /// A track was appended to the playback queue
    TrackEnqueued {
        track: Track,
        /// 1-based position in the queue right after the append
        position: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A reference could not be turned into a track
    ResolutionFailed {
        source_reference: String,
        requested_by: User,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The playback loop started streaming a track (it is now in history)
    TrackStarted {
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track stopped streaming
    TrackFinished {
        track: Track,
        /// False when the stream ended on its own
        skipped: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A distinct user voted to skip the current track
    SkipVote {
        voter: User,
        votes: usize,
        threshold: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A party playlist was installed
    PartyStarted {
        host: User,
        playlist_len: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The party was reset; carries the final history for the summary fan-out
    PartyStopped {
        history: Vec<Track>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PartyEvent {
    /// Event name, matching the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            PartyEvent::TrackEnqueued { .. } => "TrackEnqueued",
            PartyEvent::ResolutionFailed { .. } => "ResolutionFailed",
            PartyEvent::TrackStarted { .. } => "TrackStarted",
            PartyEvent::TrackFinished { .. } => "TrackFinished",
            PartyEvent::SkipVote { .. } => "SkipVote",
            PartyEvent::PartyStarted { .. } => "PartyStarted",
            PartyEvent::PartyStopped { .. } => "PartyStopped",
        }
    }

    /// Serialize for external listeners
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Broadcast bus for [`PartyEvent`]s
///
/// Cloning the bus shares the underlying channel. Sending never blocks, so
/// the bus is safe to use from the player's worker threads.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PartyEvent>,
}

impl EventBus {
    /// Creates a new bus buffering up to `capacity` events per slow receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PartyEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
