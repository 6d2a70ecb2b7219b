//! Watching ring buffer diagnostics from outside the audio threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::ring::{Diagnostics, DiagnosticsSnapshot};


pub trait Observer: Send {
    fn observe(&mut self, snapshot: &DiagnosticsSnapshot);
}


impl<F> Observer for F
where
    F: FnMut(&DiagnosticsSnapshot) + Send,
{
    fn observe(&mut self, snapshot: &DiagnosticsSnapshot) {
        (self)(snapshot)
    }
}


/// Log what changed since the previous observation: `info` when clean, `warn` on glitches.
pub struct LogObserver {
    label: String,
    last: DiagnosticsSnapshot,
}


impl LogObserver {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last: DiagnosticsSnapshot::default(),
        }
    }
}


impl Observer for LogObserver {
    fn observe(&mut self, snapshot: &DiagnosticsSnapshot) {
        let delta = snapshot.since(&self.last);
        self.last = *snapshot;
        if delta.has_glitches() {
            warn!(
                "{}: {} underruns ({} frames), {} overruns ({} frames), {} frames overwritten unread, {} misconfigured calls",
                self.label,
                delta.underruns,
                delta.underrun_frames,
                delta.overruns,
                delta.overrun_frames,
                delta.overwritten_frames,
                delta.misconfigurations,
            );
        } else {
            info!("{}: {} stores, {} fetches, no glitches", self.label, delta.stores, delta.fetches);
        }
    }
}


/// Background thread feeding periodic snapshots to observers. Stops when dropped.
pub struct Watcher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}


impl Watcher {
    pub fn spawn(
        diagnostics: Arc<Diagnostics>,
        interval: Duration,
        mut observers: Vec<Box<dyn Observer>>,
    ) -> Self {
        let (stop, stopped) = channel::bounded::<()>(1);
        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let snapshot = diagnostics.snapshot();
                    for observer in observers.iter_mut() {
                        observer.observe(&snapshot);
                    }
                },
                _ => {
                    debug!("diagnostics watcher exiting");
                    return;
                },
            }
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        // dropping the sender wakes the thread
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}


impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}
