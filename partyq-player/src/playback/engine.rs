//! Playback loop
//!
//! A single named thread consumes the playback queue one track at a time and
//! drives a [`StreamBackend`]. Two states:
//!
//! - `Idle`: the backend plays filler, the loop waits (bounded) for a track.
//! - `Playing`: the loop polls the backend until the stream ends or a skip
//!   arrives on the control channel.
//!
//! A track is appended to history the moment it starts, so skipped tracks
//! appear in history too; `TrackFinished.skipped` tells them apart.
//!
//! Every start bumps a generation counter. Skips carry the generation they
//! were issued against, so a skip that races with a natural end can never
//! cut the following track short.

use crate::error::{Error, Result};
use crate::playback::backend::StreamBackend;
use crate::playback::queue::PlaybackQueue;
use crate::playback::skip_vote::{SkipVoteTracker, VoteOutcome};
use partyq_common::{EventBus, PartyEvent, Track, User};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Externally visible playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// Commands for the playback thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineCommand {
    /// Stop the track started with this generation
    Skip(u64),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// What is playing right now
#[derive(Debug, Default)]
struct NowPlaying {
    track: Track,
    generation: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the playback thread and API callers
struct EngineShared {
    queue: Arc<PlaybackQueue>,
    now_playing: Mutex<NowPlaying>,
    history: RwLock<Vec<Track>>,
    votes: SkipVoteTracker,
    events: EventBus,
    poll_interval: Duration,
}

impl EngineShared {
    /// Take the queue head, install it as current and record it
    ///
    /// Runs under the `now_playing` lock so a concurrent reset sees either the
    /// track still queued or already playing and in history.
    fn begin_next(&self) -> Option<(Track, u64)> {
        let (track, generation) = {
            let mut now = lock(&self.now_playing);
            let track = self.queue.try_dequeue()?;
            now.generation += 1;
            now.track = track.clone();
            self.votes.clear();
            self.history
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(track.clone());
            (track, now.generation)
        };

        info!("Now playing: {}", track);
        self.events.emit_lossy(PartyEvent::TrackStarted {
            track: track.clone(),
            timestamp: chrono::Utc::now(),
        });

        Some((track, generation))
    }

    /// Leave the playing state for `generation` (no-op if a newer track started)
    fn finish(&self, track: Track, generation: u64, skipped: bool) {
        {
            let mut now = lock(&self.now_playing);
            if now.generation == generation {
                now.track = Track::nothing();
                self.votes.clear();
            }
        }

        debug!("Finished {} (skipped: {})", track, skipped);
        self.events.emit_lossy(PartyEvent::TrackFinished {
            track,
            skipped,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Handle to the playback loop
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
    control_tx: Mutex<Option<Sender<EngineCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Create an engine consuming `queue`; nothing runs until [`start`](Self::start)
    pub fn new(queue: Arc<PlaybackQueue>, events: EventBus, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                queue,
                now_playing: Mutex::new(NowPlaying::default()),
                history: RwLock::new(Vec::new()),
                votes: SkipVoteTracker::new(),
                events,
                poll_interval,
            }),
            control_tx: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Spawn the playback thread driving `backend`
    pub fn start(&self, backend: Box<dyn StreamBackend>) -> Result<()> {
        let mut thread_slot = lock(&self.thread);
        if thread_slot.is_some() {
            return Err(Error::Internal("playback loop already running".to_string()));
        }

        let (tx, rx) = mpsc::channel();
        let playback_loop = PlaybackLoop {
            shared: Arc::clone(&self.shared),
            backend,
            control_rx: rx,
        };

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || playback_loop.run())?;

        *lock(&self.control_tx) = Some(tx);
        *thread_slot = Some(handle);
        Ok(())
    }

    /// Stop the playback thread and wait for it
    pub fn shutdown(&self) {
        if let Some(tx) = lock(&self.control_tx).take() {
            let _ = tx.send(EngineCommand::Shutdown);
        }
        if let Some(handle) = lock(&self.thread).take() {
            if let Err(e) = handle.join() {
                error!("Playback thread panicked: {:?}", e);
            }
        }
    }

    /// The track playing now, or the sentinel
    pub fn current_track(&self) -> Track {
        lock(&self.shared.now_playing).track.clone()
    }

    pub fn state(&self) -> PlaybackState {
        if lock(&self.shared.now_playing).track.is_nothing() {
            PlaybackState::Idle
        } else {
            PlaybackState::Playing
        }
    }

    /// Every track started so far, in play order
    pub fn history(&self) -> Vec<Track> {
        self.shared
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the queue, stop the current track and empty the history
    ///
    /// Returns the history and the number of queued tracks dropped. Holds the
    /// `now_playing` lock throughout, so no track can start halfway through.
    pub fn reset(&self) -> (Vec<Track>, usize) {
        let (history, dropped, skipped) = {
            let mut now = lock(&self.shared.now_playing);
            let dropped = self.shared.queue.clear();
            self.shared.votes.clear();
            let skipped = (!now.track.is_nothing()).then_some(now.generation);
            now.track = Track::nothing();
            let history = std::mem::take(
                &mut *self
                    .shared
                    .history
                    .write()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            (history, dropped, skipped)
        };

        if let Some(generation) = skipped {
            self.send_skip(generation);
        }
        (history, dropped)
    }

    /// Count a skip vote against the current track
    ///
    /// Reaching the quorum skips exactly the track the vote was cast on.
    pub fn vote(&self, voter: &User, registered: usize) -> VoteOutcome {
        let (outcome, generation) = {
            let now = lock(&self.shared.now_playing);
            if now.track.is_nothing() {
                return VoteOutcome::NothingPlaying;
            }
            (self.shared.votes.register_vote(voter, registered), now.generation)
        };

        if let VoteOutcome::Skipping { votes, threshold }
        | VoteOutcome::Pending { votes, threshold } = outcome
        {
            self.shared.events.emit_lossy(PartyEvent::SkipVote {
                voter: voter.clone(),
                votes,
                threshold,
                timestamp: chrono::Utc::now(),
            });
        }

        if outcome.is_skipping() {
            self.skip_matching(Some(generation));
        }
        outcome
    }

    /// Distinct voters against the current track
    pub fn vote_count(&self) -> usize {
        self.shared.votes.count()
    }

    /// Stop the current track now; returns false if nothing was playing
    ///
    /// `current_track()` is the sentinel as soon as this returns.
    pub fn force_skip(&self) -> bool {
        self.skip_matching(None)
    }

    fn skip_matching(&self, expected: Option<u64>) -> bool {
        let generation = {
            let mut now = lock(&self.shared.now_playing);
            if expected.is_some_and(|g| g != now.generation) {
                return false;
            }
            self.shared.votes.clear();
            if now.track.is_nothing() {
                return false;
            }
            info!("Skipping {}", now.track);
            now.track = Track::nothing();
            now.generation
        };

        self.send_skip(generation);
        true
    }

    fn send_skip(&self, generation: u64) {
        match lock(&self.control_tx).as_ref() {
            Some(tx) => {
                if tx.send(EngineCommand::Skip(generation)).is_err() {
                    warn!("Playback thread gone, skip not delivered");
                }
            }
            None => warn!("Playback loop not running, skip not delivered"),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the playback thread
struct PlaybackLoop {
    shared: Arc<EngineShared>,
    backend: Box<dyn StreamBackend>,
    control_rx: Receiver<EngineCommand>,
}

impl PlaybackLoop {
    fn run(mut self) {
        info!("Playback loop started");

        loop {
            self.backend.idle();

            if self.drain_idle_commands() == Flow::Shutdown {
                break;
            }

            if !self.shared.queue.wait_for_track(self.shared.poll_interval) {
                continue;
            }
            // Emptied by a reset since the wait returned
            let Some((track, generation)) = self.shared.begin_next() else {
                continue;
            };

            if self.play(track, generation) == Flow::Shutdown {
                break;
            }
        }

        self.backend.stop();
        info!("Playback loop stopped");
    }

    /// Consume commands that arrived while idle; skips here are stale
    fn drain_idle_commands(&mut self) -> Flow {
        loop {
            match self.control_rx.try_recv() {
                Ok(EngineCommand::Skip(generation)) => {
                    debug!("Ignoring stale skip for generation {}", generation);
                }
                Ok(EngineCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return Flow::Shutdown;
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
            }
        }
    }

    fn play(&mut self, track: Track, generation: u64) -> Flow {
        let started = match track.asset_path() {
            Some(asset) => match self.backend.start(asset) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to stream {}: {}", track, e);
                    false
                }
            },
            None => {
                warn!("{} has no asset, moving on", track);
                false
            }
        };

        if !started {
            self.shared.finish(track, generation, false);
            return Flow::Continue;
        }

        loop {
            match self.control_rx.recv_timeout(self.shared.poll_interval) {
                Ok(EngineCommand::Skip(skip_generation)) if skip_generation == generation => {
                    self.backend.stop();
                    self.shared.finish(track, generation, true);
                    return Flow::Continue;
                }
                Ok(EngineCommand::Skip(stale)) => {
                    debug!("Ignoring stale skip for generation {}", stale);
                }
                Ok(EngineCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    self.backend.stop();
                    self.shared.finish(track, generation, true);
                    return Flow::Shutdown;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.backend.is_streaming() {
                        self.shared.finish(track, generation, false);
                        return Flow::Continue;
                    }
                }
            }
        }
    }
}
