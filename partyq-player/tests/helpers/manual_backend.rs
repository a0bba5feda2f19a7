//! Stream backend driven by the test
//!
//! A started track streams until the test calls
//! [`ManualControl::finish_current`] (or the engine stops it).

use partyq_player::playback::StreamBackend;
use partyq_player::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct ManualControl {
    streaming: AtomicBool,
    started: Mutex<Vec<PathBuf>>,
    stops: Mutex<usize>,
}

impl ManualControl {
    /// End the current stream as if the asset ran out
    pub fn finish_current(&self) {
        self.streaming.store(false, Ordering::SeqCst);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Assets started so far, in order
    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

pub struct ManualBackend {
    control: Arc<ManualControl>,
}

impl ManualBackend {
    pub fn boxed() -> (Box<dyn StreamBackend>, Arc<ManualControl>) {
        let control = Arc::new(ManualControl::default());
        (
            Box::new(Self {
                control: Arc::clone(&control),
            }),
            control,
        )
    }
}

impl StreamBackend for ManualBackend {
    fn start(&mut self, asset: &Path) -> Result<()> {
        self.control.started.lock().unwrap().push(asset.to_path_buf());
        self.control.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_streaming(&mut self) -> bool {
        self.control.is_streaming()
    }

    fn stop(&mut self) {
        *self.control.stops.lock().unwrap() += 1;
        self.control.streaming.store(false, Ordering::SeqCst);
    }
}
