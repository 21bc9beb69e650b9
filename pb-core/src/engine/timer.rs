//! Expiry Timer Dispatch
//!
//! Keeps at most one deadline per resource. A background thread sleeps until the
//! earliest deadline, removes every due entry and hands the resource names to the
//! engine's `on_deadline` callback. The deadline map lock is never held while the
//! callback runs; the engine arms and disarms while holding its own state lock, so the
//! lock order is always engine state, then deadlines.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::timing::DISPATCH_IDLE_WAIT;
use crate::error::{BoostError, Result};

/// Receiver of deadline events
pub trait DeadlineHandler: Send + Sync + 'static {
    fn on_deadline(&self, resource: &str) -> bool;
}

#[derive(Default)]
struct Shared {
    deadlines: Mutex<HashMap<String, Instant>>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// Per-resource deadline table plus its dispatch thread
#[derive(Default)]
pub struct ExpiryTimer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resource's deadline
    pub fn arm(&self, resource: &str, at: Instant) {
        let mut deadlines = self.shared.deadlines.lock();
        let previous = deadlines.insert(resource.to_string(), at);
        if previous != Some(at) {
            self.shared.wake.notify_one();
        }
    }

    pub fn disarm(&self, resource: &str) {
        self.shared.deadlines.lock().remove(resource);
    }

    pub fn disarm_all(&self) {
        self.shared.deadlines.lock().clear();
    }

    pub fn deadline(&self, resource: &str) -> Option<Instant> {
        self.shared.deadlines.lock().get(resource).copied()
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Start the dispatch thread
    ///
    /// The thread only holds a weak reference to the handler and exits once the handler
    /// is dropped or `stop` is called.
    pub fn start<H: DeadlineHandler>(&self, handler: Weak<H>) -> Result<()> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Ok(());
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("perfboost-timer".to_string())
            .spawn(move || dispatch_loop(&shared, handler))
            .map_err(|e| BoostError::generic(format!("failed to spawn timer thread: {}", e)))?;
        *thread = Some(handle);
        info!("Expiry dispatch thread started");
        Ok(())
    }

    /// Stop and join the dispatch thread
    pub fn stop(&self) {
        self.signal_shutdown();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Expiry dispatch thread panicked");
            }
            info!("Expiry dispatch thread stopped");
        }
    }

    fn signal_shutdown(&self) {
        let _deadlines = self.shared.deadlines.lock();
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

fn dispatch_loop<H: DeadlineHandler>(shared: &Shared, handler: Weak<H>) {
    loop {
        let due = {
            let mut deadlines = shared.deadlines.lock();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                let now = Instant::now();
                let due: Vec<String> = deadlines
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(name, _)| name.clone())
                    .collect();
                if !due.is_empty() {
                    for name in &due {
                        deadlines.remove(name);
                    }
                    break due;
                }
                let wait = deadlines
                    .values()
                    .min()
                    .map_or(DISPATCH_IDLE_WAIT, |at| at.saturating_duration_since(now));
                shared.wake.wait_for(&mut deadlines, wait);
            }
        };

        let Some(handler) = handler.upgrade() else {
            return;
        };
        for resource in due {
            debug!(resource = %resource, "deadline fired");
            handler.on_deadline(&resource);
        }
    }
}
