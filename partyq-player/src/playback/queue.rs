//! Playback queue
//!
//! FIFO of resolved tracks awaiting playback. Any number of producers append,
//! the playback loop alone removes the head. Every operation, snapshots
//! included, runs under the same mutex, so a snapshot is one consistent
//! instant and never observes a half-applied mutation.

use partyq_common::{Track, User};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    tracks: Mutex<VecDeque<Track>>,
    /// Signalled on every enqueue so a waiting consumer wakes early
    not_empty: Condvar,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Track>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a track; returns its 1-based position
    pub fn enqueue(&self, track: Track) -> usize {
        let position = {
            let mut tracks = self.lock();
            tracks.push_back(track);
            tracks.len()
        };
        self.not_empty.notify_all();
        position
    }

    /// Remove and return the head, or None if the queue is empty
    pub fn try_dequeue(&self) -> Option<Track> {
        self.lock().pop_front()
    }

    /// Wait at most `timeout` for the queue to hold a track
    ///
    /// Nothing is removed; the caller takes the head with [`try_dequeue`](Self::try_dequeue)
    /// under its own state lock. Bounded so the caller keeps polling its
    /// control state.
    pub fn wait_for_track(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut tracks = self.lock();

        loop {
            if !tracks.is_empty() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            tracks = self
                .not_empty
                .wait_timeout(tracks, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Point-in-time copy of the queue, head first
    pub fn snapshot(&self) -> Vec<Track> {
        self.lock().iter().cloned().collect()
    }

    /// Drop every queued track at once
    pub fn clear(&self) -> usize {
        let mut tracks = self.lock();
        let dropped = tracks.len();
        tracks.clear();
        dropped
    }

    /// Number of queued tracks attributed to `user`
    pub fn count_requested_by(&self, user: &User) -> usize {
        self.lock()
            .iter()
            .filter(|t| t.requested_by() == user)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
