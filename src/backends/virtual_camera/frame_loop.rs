// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for the virtual repeating request
//!
//! A repeating preview request runs on its own thread and emits frames until
//! the session that owns it stops the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a repeating loop running in a separate thread
pub struct RepeatingLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl RepeatingLoop {
    /// Start calling `loop_fn` every `interval` until stopped
    ///
    /// The closure is called until it returns `LoopAction::Stop` or
    /// [`RepeatingLoop::stop`] is called.
    pub fn start<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, ?interval, "Starting repeating loop");

        let thread_handle = thread::spawn(move || {
            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                if loop_fn() == LoopAction::Stop {
                    debug!(name = %name_clone, "Loop requested stop");
                    break;
                }

                thread::sleep(interval);
            }

            debug!(name = %name_clone, "Repeating loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take()
            && let Err(e) = handle.join()
        {
            warn!(name = %self.name, "Repeating loop thread panicked: {:?}", e);
        }
    }

    /// Signal the loop to stop and join its thread without blocking the caller
    ///
    /// Inside a tokio runtime the join runs on the blocking pool, otherwise
    /// it happens inline.
    pub fn stop_detached(mut self) {
        self.request_stop();
        let Some(handle) = self.thread_handle.take() else {
            return;
        };

        let name = std::mem::take(&mut self.name);
        let join = move || {
            if let Err(e) = handle.join() {
                warn!(name = %name, "Repeating loop thread panicked: {:?}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(join);
            }
            Err(_) => join(),
        }
    }
}

impl Drop for RepeatingLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}
