//! Idle suggester
//!
//! Background thread that keeps the party going: while nothing is playing
//! and the queue is empty, it picks a random entry from the party playlist
//! and submits it on behalf of the host. With no playlist installed it only
//! checks back every few seconds.

use crate::error::Result;
use crate::resolver::PlaylistEnumerator;
use partyq_common::User;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Host identity attached to suggested tracks
pub const HOST_USER_ID: &str = "not_defined";

/// Where suggestions go
pub trait SuggestionSink: Send + Sync {
    /// True when nothing plays and nothing is queued
    fn is_idle(&self) -> bool;

    /// Resolve and enqueue `reference` attributed to `host`
    fn suggest(&self, reference: &str, host: &User);
}

/// The installed party playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyPlaylist {
    pub references: Vec<String>,
    pub host: User,
}

impl PartyPlaylist {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Intervals for the suggester thread
#[derive(Debug, Clone, Copy)]
pub struct SuggesterTiming {
    /// Recheck period while no playlist is installed
    pub idle_poll: Duration,
    /// Period between suggestions while a playlist is installed
    pub interval: Duration,
}

struct SuggesterShared {
    playlist: Mutex<PartyPlaylist>,
    /// Signalled on playlist changes and shutdown
    changed: Condvar,
    stop_flag: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct IdleSuggester {
    shared: Arc<SuggesterShared>,
    timing: SuggesterTiming,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl IdleSuggester {
    pub fn new(timing: SuggesterTiming) -> Self {
        Self {
            shared: Arc::new(SuggesterShared {
                playlist: Mutex::new(PartyPlaylist::default()),
                changed: Condvar::new(),
                stop_flag: AtomicBool::new(false),
            }),
            timing,
            thread: Mutex::new(None),
        }
    }

    /// Spawn the suggester thread feeding `sink`
    pub fn start(&self, sink: Arc<dyn SuggestionSink>) -> Result<()> {
        let mut slot = lock(&self.thread);
        if slot.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let timing = self.timing;
        let handle = thread::Builder::new()
            .name("suggester".to_string())
            .spawn(move || Self::run(shared, timing, sink))?;

        *slot = Some(handle);
        Ok(())
    }

    pub fn shutdown(&self) {
        {
            let _guard = lock(&self.shared.playlist);
            self.shared.stop_flag.store(true, Ordering::Release);
            self.shared.changed.notify_all();
        }
        if let Some(handle) = lock(&self.thread).take() {
            if let Err(e) = handle.join() {
                error!("Suggester thread panicked: {:?}", e);
            }
        }
    }

    /// Replace the party playlist with the expansion of `playlist_reference`
    ///
    /// On enumeration failure the current playlist stays installed.
    pub fn add_playlist(
        &self,
        playlist_reference: &str,
        host_name: &str,
        enumerator: &dyn PlaylistEnumerator,
    ) -> Result<PartyPlaylist> {
        let references = enumerator.enumerate(playlist_reference)?;
        let playlist = PartyPlaylist {
            references,
            host: User::new(HOST_USER_ID, host_name),
        };

        info!(
            "Party playlist set: {} tracks hosted by {}",
            playlist.references.len(),
            playlist.host
        );
        *lock(&self.shared.playlist) = playlist.clone();
        self.shared.changed.notify_all();
        Ok(playlist)
    }

    /// Drop the playlist and its host
    pub fn delete_playlist(&self) {
        *lock(&self.shared.playlist) = PartyPlaylist::default();
        self.shared.changed.notify_all();
    }

    pub fn playlist(&self) -> PartyPlaylist {
        lock(&self.shared.playlist).clone()
    }

    fn run(shared: Arc<SuggesterShared>, timing: SuggesterTiming, sink: Arc<dyn SuggestionSink>) {
        info!("Idle suggester started");

        loop {
            let pick = {
                let playlist = lock(&shared.playlist);
                if shared.stop_flag.load(Ordering::Acquire) {
                    break;
                }
                if playlist.is_empty() || !sink.is_idle() {
                    None
                } else {
                    playlist
                        .references
                        .choose(&mut rand::thread_rng())
                        .map(|r| (r.clone(), playlist.host.clone()))
                }
            };

            // Resolution can take a while; never hold the playlist lock across it
            if let Some((reference, host)) = pick {
                debug!("Suggesting {} while idle", reference);
                sink.suggest(&reference, &host);
            }

            let playlist = lock(&shared.playlist);
            if shared.stop_flag.load(Ordering::Acquire) {
                break;
            }
            let wait = if playlist.is_empty() {
                timing.idle_poll
            } else {
                timing.interval
            };
            let _ = shared
                .changed
                .wait_timeout(playlist, wait)
                .unwrap_or_else(PoisonError::into_inner);
        }

        info!("Idle suggester stopped");
    }
}

impl Drop for IdleSuggester {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ResolutionError};
    use std::time::Instant;

    struct FixedPlaylist(Vec<String>);

    impl PlaylistEnumerator for FixedPlaylist {
        fn enumerate(&self, reference: &str) -> std::result::Result<Vec<String>, ResolutionError> {
            if reference.contains("broken") {
                return Err(ResolutionError::Network("playlist unavailable".to_string()));
            }
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        busy: AtomicBool,
        suggested: Mutex<Vec<(String, User)>>,
    }

    impl SuggestionSink for RecordingSink {
        fn is_idle(&self) -> bool {
            !self.busy.load(Ordering::SeqCst)
        }

        fn suggest(&self, reference: &str, host: &User) {
            lock(&self.suggested).push((reference.to_string(), host.clone()));
        }
    }

    fn fast_timing() -> SuggesterTiming {
        SuggesterTiming {
            idle_poll: Duration::from_millis(10),
            interval: Duration::from_millis(10),
        }
    }

    fn playlist() -> FixedPlaylist {
        FixedPlaylist(vec!["https://youtu.be/one".into(), "https://youtu.be/two".into()])
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_add_playlist_sets_host() {
        let suggester = IdleSuggester::new(fast_timing());
        let installed = suggester.add_playlist("list", "DJ Bob", &playlist()).unwrap();

        assert_eq!(installed.references.len(), 2);
        assert_eq!(installed.host, User::new(HOST_USER_ID, "DJ Bob"));
        assert_eq!(suggester.playlist(), installed);
    }

    #[test]
    fn test_failed_enumeration_keeps_previous() {
        let suggester = IdleSuggester::new(fast_timing());
        suggester.add_playlist("list", "DJ Bob", &playlist()).unwrap();

        let result = suggester.add_playlist("broken-list", "DJ Eve", &playlist());
        assert!(matches!(result, Err(Error::Playlist(ResolutionError::Network(_)))));
        assert_eq!(suggester.playlist().host.display_name(), "DJ Bob");
    }

    #[test]
    fn test_delete_playlist_resets_host() {
        let suggester = IdleSuggester::new(fast_timing());
        suggester.add_playlist("list", "DJ Bob", &playlist()).unwrap();
        suggester.delete_playlist();

        let current = suggester.playlist();
        assert!(current.is_empty());
        assert!(current.host.is_empty());
    }

    #[test]
    fn test_suggests_only_when_idle() {
        let suggester = IdleSuggester::new(fast_timing());
        let sink = Arc::new(RecordingSink::default());
        sink.busy.store(true, Ordering::SeqCst);
        suggester.start(sink.clone()).unwrap();
        suggester.add_playlist("list", "DJ Bob", &playlist()).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(lock(&sink.suggested).is_empty());

        sink.busy.store(false, Ordering::SeqCst);
        assert!(wait_for(|| !lock(&sink.suggested).is_empty()));
        suggester.shutdown();

        let (reference, host) = lock(&sink.suggested)[0].clone();
        assert!(playlist().0.contains(&reference));
        assert_eq!(host.username.as_deref(), Some("DJ Bob"));
    }

    #[test]
    fn test_no_playlist_no_suggestions() {
        let suggester = IdleSuggester::new(fast_timing());
        let sink = Arc::new(RecordingSink::default());
        suggester.start(sink.clone()).unwrap();

        thread::sleep(Duration::from_millis(50));
        suggester.shutdown();
        assert!(lock(&sink.suggested).is_empty());
    }
}
