//! Party facade
//!
//! Wires the resolver pool, playback queue, playback loop, skip votes, user
//! registry and idle suggester together and exposes the operations request
//! front-ends call. Every method here is blocking and safe to call from any
//! thread; async callers should go through `spawn_blocking`.

use crate::cache;
use crate::config::PlayerConfig;
use crate::error::{AddTrackError, Result, VoteRejected};
use crate::playback::{
    IdleSuggester, PartyPlaylist, PlaybackEngine, PlaybackQueue, PlaybackState, ResolverPool,
    StreamBackend, SuggesterTiming, SuggestionSink, VoteOutcome,
};
use crate::resolver::{MediaResolver, PlaylistEnumerator};
use crate::users::UserRegistry;
use partyq_common::{EventBus, PartyEvent, Track, User};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Components shared with the suggester thread
struct PartyCore {
    pool: ResolverPool,
    queue: Arc<PlaybackQueue>,
    engine: PlaybackEngine,
    users: UserRegistry,
    /// Resolutions currently running per requester
    in_flight: Mutex<HashMap<User, usize>>,
    max_queued_per_user: usize,
    events: EventBus,
}

/// Releases an in-flight slot when the request finishes, however it ends
struct InFlightSlot<'a> {
    core: &'a PartyCore,
    user: User,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.core.in_flight);
        if let Some(count) = in_flight.get_mut(&self.user) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.user);
            }
        }
    }
}

impl PartyCore {
    /// Claim one of the requester's slots (queued plus resolving)
    fn reserve(&self, requester: &User) -> std::result::Result<InFlightSlot<'_>, AddTrackError> {
        let mut in_flight = lock(&self.in_flight);
        let resolving = in_flight.get(requester).copied().unwrap_or(0);
        let queued = self.queue.count_requested_by(requester) + resolving;

        if queued >= self.max_queued_per_user {
            return Err(AddTrackError::DuplicateRequestThrottled {
                queued,
                limit: self.max_queued_per_user,
            });
        }

        *in_flight.entry(requester.clone()).or_insert(0) += 1;
        Ok(InFlightSlot {
            core: self,
            user: requester.clone(),
        })
    }

    fn add_track(
        &self,
        reference: &str,
        requester: &User,
    ) -> std::result::Result<Track, AddTrackError> {
        if self.users.is_banned(requester) {
            return Err(AddTrackError::Banned(requester.clone()));
        }

        let _slot = self.reserve(requester)?;

        let cached = cache::lookup(reference, &self.engine.history(), &self.queue.snapshot());
        let track = match cached {
            Some(cached) => {
                debug!("Cache hit for {}", reference);
                cache::reuse(&cached, requester)
            }
            None => match self.pool.resolve(reference, requester) {
                Ok(track) => track,
                Err(e) => {
                    self.events.emit_lossy(PartyEvent::ResolutionFailed {
                        source_reference: reference.to_string(),
                        requested_by: requester.clone(),
                        reason: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    return Err(e.into());
                }
            },
        };

        let position = self.queue.enqueue(track.clone());
        info!("Queued {} at position {}", track, position);
        self.events.emit_lossy(PartyEvent::TrackEnqueued {
            track: track.clone(),
            position,
            timestamp: chrono::Utc::now(),
        });

        Ok(track)
    }
}

impl SuggestionSink for PartyCore {
    fn is_idle(&self) -> bool {
        self.engine.current_track().is_nothing() && self.queue.is_empty()
    }

    fn suggest(&self, reference: &str, host: &User) {
        match self.add_track(reference, host) {
            Ok(track) => info!("Suggested {}", track),
            Err(e) => warn!("Suggestion {} not added: {}", reference, e),
        }
    }
}

/// One running party
pub struct Party {
    core: Arc<PartyCore>,
    suggester: IdleSuggester,
    enumerator: Arc<dyn PlaylistEnumerator>,
}

impl Party {
    /// Build the pipeline; threads other than the resolver workers start in [`start`](Self::start)
    pub fn new(
        config: &PlayerConfig,
        resolver: Arc<dyn MediaResolver>,
        enumerator: Arc<dyn PlaylistEnumerator>,
    ) -> Result<Self> {
        let events = EventBus::new(config.event_capacity);
        let queue = Arc::new(PlaybackQueue::new());
        let pool = ResolverPool::new(resolver, config.effective_worker_count())?;
        let engine = PlaybackEngine::new(
            Arc::clone(&queue),
            events.clone(),
            config.playback_poll_interval(),
        );

        let core = Arc::new(PartyCore {
            pool,
            queue,
            engine,
            users: UserRegistry::new(),
            in_flight: Mutex::new(HashMap::new()),
            max_queued_per_user: config.max_queued_per_user,
            events,
        });

        let suggester = IdleSuggester::new(SuggesterTiming {
            idle_poll: config.suggester_idle_poll(),
            interval: config.suggester_interval(),
        });

        Ok(Self {
            core,
            suggester,
            enumerator,
        })
    }

    /// Start the playback loop on `backend` and the idle suggester
    pub fn start(&self, backend: Box<dyn StreamBackend>) -> Result<()> {
        self.core.engine.start(backend)?;
        self.suggester.start(Arc::clone(&self.core) as Arc<dyn SuggestionSink>)?;
        info!("Party pipeline running");
        Ok(())
    }

    /// Stop every thread; the party cannot be restarted afterwards
    pub fn shutdown(&self) {
        self.suggester.shutdown();
        self.core.engine.shutdown();
        self.core.pool.shutdown();
    }

    /// Resolve `reference` (or reuse a cached track) and queue it for `requester`
    ///
    /// Blocks until resolution finishes.
    pub fn add_track(
        &self,
        reference: &str,
        requester: &User,
    ) -> std::result::Result<Track, AddTrackError> {
        self.core.add_track(reference, requester)
    }

    /// Queue a track without attributing it to `submitter`
    pub fn add_track_anonymous(
        &self,
        reference: &str,
        submitter: &User,
    ) -> std::result::Result<Track, AddTrackError> {
        if self.core.users.is_banned(submitter) {
            return Err(AddTrackError::Banned(submitter.clone()));
        }
        self.core.add_track(reference, &User::anonymous())
    }

    pub fn current_track(&self) -> Track {
        self.core.engine.current_track()
    }

    pub fn state(&self) -> PlaybackState {
        self.core.engine.state()
    }

    pub fn history(&self) -> Vec<Track> {
        self.core.engine.history()
    }

    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.core.queue.snapshot()
    }

    /// Vote to skip the current track
    pub fn vote_skip(&self, user: &User) -> std::result::Result<VoteOutcome, VoteRejected> {
        if self.core.users.is_banned(user) {
            return Err(VoteRejected::Banned(user.clone()));
        }
        if !self.core.users.is_registered(user) {
            return Err(VoteRejected::NotRegistered(user.clone()));
        }

        let outcome = self.core.engine.vote(user, self.core.users.active_count());
        info!("Skip vote from {}: {}", user, outcome);
        Ok(outcome)
    }

    /// Skip regardless of votes
    pub fn force_skip(&self) -> bool {
        self.core.engine.force_skip()
    }

    pub fn register_user(&self, user: &User) -> bool {
        self.core.users.register(user)
    }

    pub fn ban_user(&self, user: &User) -> bool {
        self.core.users.ban(user)
    }

    pub fn users(&self) -> &UserRegistry {
        &self.core.users
    }

    /// Install the party playlist the idle suggester draws from
    pub fn start_party(&self, playlist_reference: &str, host_name: &str) -> Result<PartyPlaylist> {
        let playlist = self
            .suggester
            .add_playlist(playlist_reference, host_name, self.enumerator.as_ref())?;

        self.core.events.emit_lossy(PartyEvent::PartyStarted {
            host: playlist.host.clone(),
            playlist_len: playlist.references.len(),
            timestamp: chrono::Utc::now(),
        });
        Ok(playlist)
    }

    pub fn playlist(&self) -> PartyPlaylist {
        self.suggester.playlist()
    }

    /// Reset all party state and return the history it ended with
    ///
    /// Resolutions already running are not cancelled; their tracks are still
    /// queued when they complete.
    pub fn stop_party(&self) -> Vec<Track> {
        // Playlist first so the suggester cannot refill the queue mid-reset
        self.suggester.delete_playlist();
        let (history, dropped) = self.core.engine.reset();
        self.core.users.clear();

        info!(
            "Party stopped: {} tracks played, {} dropped from the queue",
            history.len(),
            dropped
        );
        self.core.events.emit_lossy(PartyEvent::PartyStopped {
            history: history.clone(),
            timestamp: chrono::Utc::now(),
        });
        history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.core.events.subscribe()
    }
}

impl Drop for Party {
    fn drop(&mut self) {
        self.shutdown();
    }
}
