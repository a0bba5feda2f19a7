//! Stream backends
//!
//! The playback loop hands a resolved asset to a [`StreamBackend`] and polls
//! it until the stream ends. Two implementations:
//!
//! - [`CommandBackend`] runs an external streaming command (ffmpeg pushing to
//!   an icecast mount by default) once per track, and loops a filler asset
//!   through the same command while the queue is empty so listeners stay
//!   connected.
//! - [`ClockBackend`] streams nothing and simply lets each track "play" for
//!   its probed duration. Used for dry runs.

use crate::audio::probe::probe_asset;
use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Placeholder replaced by the asset path in the stream command
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Something that can stream one asset at a time
///
/// Only the playback thread talks to a backend.
pub trait StreamBackend: Send {
    /// Start streaming `asset`, replacing whatever was streaming before
    fn start(&mut self, asset: &Path) -> Result<()>;

    /// True while the last started asset is still streaming
    ///
    /// A backend that cannot tell reports false, so playback moves on.
    fn is_streaming(&mut self) -> bool;

    /// Stop the current stream immediately
    fn stop(&mut self);

    /// Called on every idle poll while nothing is playing
    fn idle(&mut self) {}
}

/// Build the backend selected by the config
pub fn from_config(config: &BackendConfig) -> Result<Box<dyn StreamBackend>> {
    match config.kind {
        BackendKind::Command => Ok(Box::new(CommandBackend::new(
            config.stream_command.clone(),
            config.filler_asset.clone(),
        )?)),
        BackendKind::Clock => Ok(Box::new(ClockBackend::new(Duration::from_secs(
            config.fallback_track_secs,
        )))),
    }
}

/// Streams through an external command, one child process per asset
pub struct CommandBackend {
    command: Vec<String>,
    filler_asset: PathBuf,
    current: Option<Child>,
    filler: Option<Child>,
    filler_missing_logged: bool,
}

impl CommandBackend {
    pub fn new(command: Vec<String>, filler_asset: PathBuf) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("stream command must not be empty".to_string()));
        }
        Ok(Self {
            command,
            filler_asset,
            current: None,
            filler: None,
            filler_missing_logged: false,
        })
    }

    fn spawn_for(&self, asset: &Path) -> Result<Child> {
        let input = asset.to_string_lossy();
        let mut args = self
            .command
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input));

        // Non-empty checked in new()
        let program = args.next().unwrap_or_default();
        Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| Error::Backend(format!("failed to spawn {}: {}", program, e)))
    }

    fn kill(child: &mut Option<Child>) {
        if let Some(mut child) = child.take() {
            if let Err(e) = child.kill() {
                debug!("Stream process already gone: {}", e);
            }
            let _ = child.wait();
        }
    }

    fn still_running(child: &mut Option<Child>) -> bool {
        let Some(running) = child.as_mut() else {
            return false;
        };
        match running.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if !status.success() {
                    warn!("Stream process exited with {}", status);
                }
                *child = None;
                false
            }
            Err(e) => {
                warn!("Failed to poll stream process: {}", e);
                Self::kill(child);
                false
            }
        }
    }
}

impl StreamBackend for CommandBackend {
    fn start(&mut self, asset: &Path) -> Result<()> {
        Self::kill(&mut self.filler);
        Self::kill(&mut self.current);

        info!("Streaming {}", asset.display());
        self.current = Some(self.spawn_for(asset)?);
        Ok(())
    }

    fn is_streaming(&mut self) -> bool {
        Self::still_running(&mut self.current)
    }

    fn stop(&mut self) {
        Self::kill(&mut self.current);
    }

    fn idle(&mut self) {
        if Self::still_running(&mut self.filler) {
            return;
        }
        if !self.filler_asset.is_file() {
            if !self.filler_missing_logged {
                warn!(
                    "Filler asset {} not found, stream stays silent while idle",
                    self.filler_asset.display()
                );
                self.filler_missing_logged = true;
            }
            return;
        }

        debug!("Looping filler {}", self.filler_asset.display());
        match self.spawn_for(&self.filler_asset) {
            Ok(child) => self.filler = Some(child),
            Err(e) => warn!("Failed to start filler: {}", e),
        }
    }
}

impl Drop for CommandBackend {
    fn drop(&mut self) {
        Self::kill(&mut self.current);
        Self::kill(&mut self.filler);
    }
}

/// Plays each asset for its probed duration without producing audio
pub struct ClockBackend {
    fallback: Duration,
    ends_at: Option<Instant>,
}

impl ClockBackend {
    /// `fallback` is used for assets whose duration cannot be probed
    pub fn new(fallback: Duration) -> Self {
        Self {
            fallback,
            ends_at: None,
        }
    }
}

impl StreamBackend for ClockBackend {
    fn start(&mut self, asset: &Path) -> Result<()> {
        let length = match probe_asset(asset) {
            Ok(info) => info.duration.unwrap_or(self.fallback),
            Err(e) => {
                debug!("Probe failed for {} ({}), using fallback length", asset.display(), e);
                self.fallback
            }
        };

        info!("Playing {} for {:.1}s (dry run)", asset.display(), length.as_secs_f64());
        self.ends_at = Some(Instant::now() + length);
        Ok(())
    }

    fn is_streaming(&mut self) -> bool {
        self.ends_at.is_some_and(|end| Instant::now() < end)
    }

    fn stop(&mut self) {
        self.ends_at = None;
    }
}
