//! Manual-reset wait events and reusable cancellation tokens.
//!
//! Workers block on these between cycles; state-change requests signal them.
//! Both primitives survive dispose: a disposed event behaves as permanently
//! completed so late waiters never hang.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A manual-reset signaling event.
///
/// `begin` puts the event in progress (waiters block), `complete` releases
/// all waiters until the next `begin`.
#[derive(Debug)]
pub struct WaitEvent {
    in_progress: Mutex<bool>,
    signal: Condvar,
    disposed: AtomicBool,
}

impl WaitEvent {
    /// Create a new event in the completed state.
    pub fn new() -> Self {
        Self {
            in_progress: Mutex::new(false),
            signal: Condvar::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Create a new event already in progress.
    pub fn begun() -> Self {
        let event = Self::new();
        event.begin();
        event
    }

    /// Put the event in progress so waiters block.
    ///
    /// No-op after dispose.
    pub fn begin(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        *self.in_progress.lock() = true;
    }

    /// Complete the event, releasing all current waiters.
    pub fn complete(&self) {
        *self.in_progress.lock() = false;
        self.signal.notify_all();
    }

    pub fn is_completed(&self) -> bool {
        !*self.in_progress.lock()
    }

    /// Block until the event completes.
    pub fn wait(&self) {
        let mut in_progress = self.in_progress.lock();
        while *in_progress {
            self.signal.wait(&mut in_progress);
        }
    }

    /// Block until the event completes or the timeout elapses.
    ///
    /// Returns `true` when the event completed within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_progress = self.in_progress.lock();
        while *in_progress {
            if self.signal.wait_until(&mut in_progress, deadline).timed_out() {
                break;
            }
        }
        !*in_progress
    }

    /// Permanently complete the event. Subsequent waits return immediately.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.complete();
    }
}

impl Default for WaitEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheaply cloneable, pollable, waitable cancellation token.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<WaitEvent>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            inner: Arc::new(WaitEvent::begun()),
        }
    }

    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Self::new()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_completed()
    }

    fn cancel(&self) {
        self.inner.complete();
    }

    /// Wait for cancellation, up to `timeout`.
    ///
    /// Returns `true` when the token was cancelled within the timeout, which
    /// is how workers implement interruptible cycle delays.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_timeout(timeout)
    }

    /// Wait indefinitely for cancellation.
    pub fn wait(&self) {
        self.inner.wait();
    }
}

/// Owner of the current cycle cancellation token.
///
/// `cancel` cancels the outstanding token and installs a fresh, uncancelled
/// token for the next cycle, so tokens are single-use but the owner is
/// reusable for the worker's whole lifetime.
#[derive(Debug)]
pub struct CancellationTokenOwner {
    current: Mutex<CancellationToken>,
}

impl CancellationTokenOwner {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// Get a clone of the current cycle's token.
    pub fn token(&self) -> CancellationToken {
        self.current.lock().clone()
    }

    /// Cancel the current token and issue a fresh one.
    pub fn cancel(&self) {
        let mut current = self.current.lock();
        current.cancel();
        *current = CancellationToken::new();
    }
}

impl Default for CancellationTokenOwner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completed_event_passes_waiters_through() {
        let event = WaitEvent::new();
        assert!(event.is_completed());
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn waiters_block_until_complete() {
        let event = Arc::new(WaitEvent::begun());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || {
                event.wait();
                true
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        event.complete();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_timeout_reports_expiry() {
        let event = WaitEvent::begun();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
        event.complete();
        assert!(event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn dispose_completes_permanently() {
        let event = WaitEvent::begun();
        event.dispose();
        assert!(event.is_completed());
        event.begin();
        assert!(event.is_completed());
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn cancel_reissues_a_fresh_token() {
        let owner = CancellationTokenOwner::new();
        let first = owner.token();
        assert!(!first.is_cancelled());
        owner.cancel();
        assert!(first.is_cancelled());
        assert!(first.wait_timeout(Duration::from_millis(1)));
        let second = owner.token();
        assert!(!second.is_cancelled());
    }
}
