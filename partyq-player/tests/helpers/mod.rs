//! Shared infrastructure for partyq-player integration tests
//!
//! - FakeResolver: scripted resolver and playlist enumerator
//! - ManualBackend: stream backend the test finishes by hand
//! - audio_generator: WAV fixtures for the real local pipeline

#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_resolver;
pub mod manual_backend;

pub use audio_generator::generate_silent_wav;
pub use fake_resolver::FakeResolver;
pub use manual_backend::{ManualBackend, ManualControl};

use partyq_player::PlayerConfig;
use partyq_common::User;
use std::thread;
use std::time::{Duration, Instant};

/// Config with fast polling and a small fixed worker pool
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        worker_count: Some(4),
        playback_poll_ms: 10,
        suggester_idle_poll_secs: 1,
        suggester_interval_secs: 1,
        event_capacity: 64,
        ..PlayerConfig::default()
    }
}

pub fn user(id: &str) -> User {
    User::new(id, format!("@{}", id))
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
