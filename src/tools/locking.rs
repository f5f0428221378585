//! Uniform shared/exclusive locking with timed acquisition.

use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::constants::DEFAULT_LOCK_TIMEOUT;

/// Reader-writer lock wrapper guarding a buffer's state.
///
/// Guards release on every exit path. Writers are non-reentrant: acquiring
/// the writer while holding any guard on the same locker on the same thread
/// deadlocks, so callers release before re-acquiring.
#[derive(Debug, Default)]
pub struct SyncLocker<T> {
    inner: RwLock<T>,
}

impl<T> SyncLocker<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquire shared access, blocking until available.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Acquire exclusive access, blocking until available.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Acquire shared access within the default timeout.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.try_read_for(DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquire exclusive access within the default timeout.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.try_write_for(DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquire shared access within `timeout`, or `None` on expiry.
    pub fn try_read_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read_for(timeout)
    }

    /// Acquire exclusive access within `timeout`, or `None` on expiry.
    pub fn try_write_for(&self, timeout: Duration) -> Option<RwLockWriteGuard<'_, T>> {
        self.inner.try_write_for(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_share_access() {
        let locker = SyncLocker::new(5);
        let a = locker.read();
        let b = locker.read();
        assert_eq!(*a + *b, 10);
    }

    #[test]
    fn timed_writer_fails_while_read_held() {
        let locker = Arc::new(SyncLocker::new(0));
        let guard = locker.read();
        let contender = {
            let locker = locker.clone();
            thread::spawn(move || locker.try_write_for(Duration::from_millis(20)).is_some())
        };
        let acquired = contender.join().unwrap();
        drop(guard);
        assert!(!acquired);
        assert!(locker.try_write().is_some());
    }

    #[test]
    fn writer_releases_on_scope_exit() {
        let locker = SyncLocker::new(1);
        {
            let mut guard = locker.write();
            *guard = 2;
        }
        assert_eq!(*locker.read(), 2);
    }
}
