//! Scripted resolver for pipeline tests
//!
//! Every reference resolves to `/fake-cache/<reference>.mp3` unless the test
//! scripted a delay or a failure for it. Calls are recorded so tests can
//! assert how often resolution actually ran.

use partyq_common::{Track, User};
use partyq_player::error::ResolutionError;
use partyq_player::resolver::{MediaResolver, PlaylistEnumerator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[derive(Default)]
pub struct FakeResolver {
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, ResolutionError>>,
    playlist: Mutex<Vec<String>>,
    started: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, reference: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(reference.to_string(), delay);
        self
    }

    pub fn with_failure(self, reference: &str, error: ResolutionError) -> Self {
        self.failures.lock().unwrap().insert(reference.to_string(), error);
        self
    }

    pub fn with_playlist(self, references: &[&str]) -> Self {
        *self.playlist.lock().unwrap() = references.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Resolutions that have begun (including ones still sleeping)
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// References resolved to completion, in completion order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, reference: &str) -> usize {
        self.calls().iter().filter(|r| *r == reference).count()
    }
}

impl MediaResolver for FakeResolver {
    fn resolve(&self, reference: &str, requester: &User) -> Result<Track, ResolutionError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(reference).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        self.calls.lock().unwrap().push(reference.to_string());

        if let Some(error) = self.failures.lock().unwrap().get(reference) {
            return Err(error.clone());
        }

        Ok(Track::resolved(
            reference,
            format!("/fake-cache/{}.mp3", reference),
            format!("Song {}", reference),
            requester.clone(),
        ))
    }
}

impl PlaylistEnumerator for FakeResolver {
    fn enumerate(&self, playlist_reference: &str) -> Result<Vec<String>, ResolutionError> {
        if let Some(error) = self.failures.lock().unwrap().get(playlist_reference) {
            return Err(error.clone());
        }
        Ok(self.playlist.lock().unwrap().clone())
    }
}
