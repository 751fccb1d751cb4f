//! Cooperative stop/pause flags.
//!
//! Executors call [`ControlFlags::check_stop_or_pause`] before every
//! command emission and every poll cycle. Pause blocks the caller on a
//! condvar; stop turns the next check into `CANCELLED`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use enose_error::{EnoseError, Result};

/// How long a paused thread sleeps between stop-flag re-checks.
const PAUSE_RECHECK: Duration = Duration::from_millis(100);

/// Shared stop/pause flag pair.
#[derive(Debug, Default)]
pub struct ControlFlags {
    stop: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl ControlFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cooperative stop. Wakes any paused waiter.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _paused = self.paused.lock();
        self.resumed.notify_all();
    }

    /// Request a cooperative pause at the next yield point.
    pub fn request_pause(&self) {
        *self.paused.lock() = true;
    }

    /// Resume a paused run.
    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    /// Clear both flags before a new run.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        *self.paused.lock() = false;
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Yield point: returns `CANCELLED` once a stop is requested, and
    /// blocks while paused (a stop also wakes and cancels a paused
    /// waiter).
    ///
    /// # Errors
    /// `EnoseError::Cancelled` when a stop has been requested.
    pub fn check_stop_or_pause(&self) -> Result<()> {
        if self.is_stop_requested() {
            return Err(EnoseError::Cancelled);
        }
        let mut paused = self.paused.lock();
        while *paused {
            if self.is_stop_requested() {
                return Err(EnoseError::Cancelled);
            }
            // Timed wait so a stop without a notify still gets noticed.
            let _ = self.resumed.wait_for(&mut paused, PAUSE_RECHECK);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stop_cancels() {
        let flags = ControlFlags::new();
        assert!(flags.check_stop_or_pause().is_ok());
        flags.request_stop();
        assert!(flags.check_stop_or_pause().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_reset_clears_flags() {
        let flags = ControlFlags::new();
        flags.request_stop();
        flags.request_pause();
        flags.reset();
        assert!(!flags.is_stop_requested());
        assert!(!flags.is_paused());
        assert!(flags.check_stop_or_pause().is_ok());
    }

    // === Test: a paused waiter is released by resume ===
    #[test]
    fn test_pause_blocks_until_resume() {
        let flags = Arc::new(ControlFlags::new());
        flags.request_pause();
        let worker = {
            let flags = Arc::clone(&flags);
            std::thread::spawn(move || flags.check_stop_or_pause())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());
        flags.resume();
        assert!(worker.join().unwrap().is_ok());
    }

    // === Test: stop escalates out of a pause ===
    #[test]
    fn test_stop_wakes_paused_waiter() {
        let flags = Arc::new(ControlFlags::new());
        flags.request_pause();
        let worker = {
            let flags = Arc::clone(&flags);
            std::thread::spawn(move || flags.check_stop_or_pause())
        };
        std::thread::sleep(Duration::from_millis(50));
        flags.request_stop();
        assert!(worker.join().unwrap().unwrap_err().is_cancelled());
    }
}
