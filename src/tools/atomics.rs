//! Typed atomic cells for scalar state shared across worker threads.
//!
//! Workers read flags and counters on every cycle, so these cells expose
//! sequentially consistent loads and stores over a single backing word.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crate::time::MediaTime;

/// A sequentially consistent boolean flag.
///
/// Used for `is_disposed`, `has_initialized`, sync-buffering, and similar
/// cross-thread markers.
#[derive(Debug, Default)]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub const fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    pub fn value(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Set the flag and return the previous value.
    pub fn exchange(&self, value: bool) -> bool {
        self.0.swap(value, Ordering::SeqCst)
    }
}

/// A sequentially consistent signed counter.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicI64);

impl AtomicCounter {
    pub const fn new(value: i64) -> Self {
        Self(AtomicI64::new(value))
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Atomically add one and return the new value.
    pub fn increment(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Atomically subtract one and return the new value.
    pub fn decrement(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// A [`MediaTime`] cell over an atomic 64-bit word.
#[derive(Debug)]
pub struct AtomicTimeCell(AtomicI64);

impl AtomicTimeCell {
    pub const fn new(value: MediaTime) -> Self {
        Self(AtomicI64::new(value.as_micros()))
    }

    pub fn value(&self) -> MediaTime {
        MediaTime::from_micros(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, value: MediaTime) {
        self.0.store(value.as_micros(), Ordering::SeqCst);
    }
}

impl Default for AtomicTimeCell {
    fn default() -> Self {
        Self::new(MediaTime::MIN)
    }
}

/// An `f64` cell bit-cast over an atomic 64-bit word.
///
/// Carries speed ratios and progress fractions between threads.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flag_exchange_returns_previous() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.exchange(true));
        assert!(flag.exchange(true));
        assert!(flag.value());
    }

    #[test]
    fn counter_increments_atomically_across_threads() {
        let counter = Arc::new(AtomicCounter::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1_000 {
                    counter.increment();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.value(), 4_000);
    }

    #[test]
    fn time_cell_defaults_to_never() {
        let cell = AtomicTimeCell::default();
        assert_eq!(cell.value(), MediaTime::MIN);
        cell.set(MediaTime::from_millis(42));
        assert_eq!(cell.value(), MediaTime::from_millis(42));
    }

    #[test]
    fn f64_cell_round_trips_bits() {
        let cell = AtomicF64::new(1.5);
        assert_eq!(cell.value(), 1.5);
        cell.set(-0.25);
        assert_eq!(cell.value(), -0.25);
    }
}
