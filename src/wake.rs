//! A non-blocking wake signal from the render callback to the decoding
//! thread.
//!
//! `parking_lot::Condvar::notify_one` does not require the calling thread
//! to hold the paired mutex and returns without waiting for the woken
//! thread to run, so it is used directly here rather than introducing a
//! platform-specific semaphore. Grounded on `streaming.rs`'s use of
//! `parking_lot` throughout for exactly this kind of short, uncontended
//! coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Wakes a single waiting decoding thread without blocking the caller.
pub struct Waker {
    lock: Mutex<()>,
    cvar: Condvar,
    pending: AtomicBool,
}

impl Waker {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cvar: Condvar::new(),
            pending: AtomicBool::new(false),
        }
    }

    /// Signal that there may be new work (ring space freed, a command
    /// queued, shutdown requested). Coalesces: multiple calls before the
    /// waiter wakes are equivalent to one.
    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);
        self.cvar.notify_one();
    }

    /// Block until woken, `timeout` elapses, or a signal was already
    /// pending since the last call to this method.
    pub fn wait_timeout(&self, timeout: Duration) {
        if self.pending.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut guard = self.lock.lock();
        self.cvar.wait_for(&mut guard, timeout);
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for Waker {
    fn default() -> Self {
        Self::new()
    }
}
