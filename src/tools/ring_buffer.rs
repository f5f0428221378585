//! Fixed-capacity circular byte buffer with rewind support and write tags.

use crate::error::PlaybackError;
use crate::time::MediaTime;
use crate::tools::atomics::AtomicFlag;
use crate::tools::locking::SyncLocker;

#[derive(Debug)]
struct RingState {
    data: Vec<u8>,
    read_index: usize,
    write_index: usize,
    readable: usize,
    write_tag: MediaTime,
}

/// A bounded circular buffer of raw bytes.
///
/// Writes may optionally overwrite unread data; reads can be undone with
/// [`CircularBuffer::rewind`] as long as the writer has not caught up. The
/// last successful write records a caller-supplied timestamp tag.
#[derive(Debug)]
pub struct CircularBuffer {
    state: SyncLocker<RingState>,
    disposed: AtomicFlag,
}

impl CircularBuffer {
    /// Create a buffer holding exactly `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            state: SyncLocker::new(RingState {
                data: vec![0; capacity],
                read_index: 0,
                write_index: 0,
                readable: 0,
                write_tag: MediaTime::MIN,
            }),
            disposed: AtomicFlag::new(false),
        }
    }

    /// Total capacity in bytes.
    pub fn length(&self) -> usize {
        if self.disposed.value() {
            return 0;
        }
        self.state.read().data.len()
    }

    pub fn read_index(&self) -> usize {
        self.state.read().read_index
    }

    pub fn write_index(&self) -> usize {
        self.state.read().write_index
    }

    /// Bytes available to read.
    pub fn readable_count(&self) -> usize {
        if self.disposed.value() {
            return 0;
        }
        self.state.read().readable
    }

    /// Bytes available to write without overwriting.
    pub fn writable_count(&self) -> usize {
        if self.disposed.value() {
            return 0;
        }
        let state = self.state.read();
        state.data.len() - state.readable
    }

    /// Bytes the read index can be stepped back without touching unwritten
    /// or overwritten regions.
    pub fn rewindable_count(&self) -> usize {
        if self.disposed.value() {
            return 0;
        }
        let state = self.state.read();
        if state.write_index < state.read_index {
            state.read_index - state.write_index
        } else {
            state.read_index
        }
    }

    /// Timestamp tag of the last successful write.
    pub fn write_tag(&self) -> MediaTime {
        self.state.read().write_tag
    }

    /// Fill level in `[0, 1]`.
    pub fn capacity_percent(&self) -> f64 {
        if self.disposed.value() {
            return 0.0;
        }
        let state = self.state.read();
        state.readable as f64 / state.data.len() as f64
    }

    /// Copy `src` into the buffer in wrap-safe chunks.
    ///
    /// # Arguments
    ///
    /// * `src` - Bytes to append at the write index.
    /// * `tag` - Timestamp recorded as the write tag, only on success.
    /// * `overwrite` - When set, unread bytes are consumed oldest-first to
    ///   make room instead of failing with [`PlaybackError::NoRoom`].
    pub fn write(&self, src: &[u8], tag: MediaTime, overwrite: bool) -> Result<(), PlaybackError> {
        self.ensure_alive()?;
        let mut state = self.state.write();
        let capacity = state.data.len();
        let writable = capacity - state.readable;
        if !overwrite && src.len() > writable {
            return Err(PlaybackError::NoRoom {
                requested: src.len(),
                writable,
            });
        }

        // Only the last `capacity` bytes can survive an overwriting write.
        let src = if src.len() > capacity {
            &src[src.len() - capacity..]
        } else {
            src
        };

        let mut offset = 0;
        while offset < src.len() {
            let write_index = state.write_index;
            let chunk = (capacity - write_index).min(src.len() - offset);
            state.data[write_index..write_index + chunk]
                .copy_from_slice(&src[offset..offset + chunk]);
            state.write_index = (write_index + chunk) % capacity;
            offset += chunk;
        }

        state.readable = (state.readable + src.len()).min(capacity);
        if overwrite && src.len() > writable {
            // Oldest unread bytes were clobbered.
            state.read_index = state.write_index;
        }
        state.write_tag = tag;
        Ok(())
    }

    /// Read `count` bytes, advancing the read index.
    pub fn read(&self, count: usize) -> Result<Vec<u8>, PlaybackError> {
        let mut dst = vec![0; count];
        self.read_into(&mut dst)?;
        Ok(dst)
    }

    /// Read exactly `dst.len()` bytes into `dst`.
    pub fn read_into(&self, dst: &mut [u8]) -> Result<(), PlaybackError> {
        self.ensure_alive()?;
        let mut state = self.state.write();
        if dst.len() > state.readable {
            return Err(PlaybackError::NotEnoughData {
                requested: dst.len(),
                available: state.readable,
            });
        }
        let capacity = state.data.len();
        let mut offset = 0;
        while offset < dst.len() {
            let read_index = state.read_index;
            let chunk = (capacity - read_index).min(dst.len() - offset);
            dst[offset..offset + chunk].copy_from_slice(&state.data[read_index..read_index + chunk]);
            state.read_index = (read_index + chunk) % capacity;
            offset += chunk;
        }
        state.readable -= dst.len();
        Ok(())
    }

    /// Advance the read index without copying.
    pub fn skip(&self, count: usize) -> Result<(), PlaybackError> {
        self.ensure_alive()?;
        let mut state = self.state.write();
        if count > state.readable {
            return Err(PlaybackError::NotEnoughData {
                requested: count,
                available: state.readable,
            });
        }
        state.read_index = (state.read_index + count) % state.data.len();
        state.readable -= count;
        Ok(())
    }

    /// Step the read index back so previously read bytes become readable
    /// again.
    pub fn rewind(&self, count: usize) -> Result<(), PlaybackError> {
        self.ensure_alive()?;
        let mut state = self.state.write();
        let rewindable = if state.write_index < state.read_index {
            state.read_index - state.write_index
        } else {
            state.read_index
        };
        if count > rewindable {
            return Err(PlaybackError::NotEnoughData {
                requested: count,
                available: rewindable,
            });
        }
        state.read_index -= count;
        state.readable += count;
        Ok(())
    }

    /// Reset indices and the write tag.
    pub fn clear(&self) {
        if self.disposed.value() {
            return;
        }
        let mut state = self.state.write();
        state.read_index = 0;
        state.write_index = 0;
        state.readable = 0;
        state.write_tag = MediaTime::MIN;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.value()
    }

    /// Release the backing storage. Subsequent operations fail with
    /// [`PlaybackError::Disposed`]; getters report empty.
    pub fn dispose(&self) {
        if self.disposed.exchange(true) {
            return;
        }
        let mut state = self.state.write();
        state.data = Vec::new();
        state.read_index = 0;
        state.write_index = 0;
        state.readable = 0;
        state.write_tag = MediaTime::MIN;
    }

    fn ensure_alive(&self) -> Result<(), PlaybackError> {
        if self.disposed.value() {
            Err(PlaybackError::Disposed("circular buffer"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let ring = CircularBuffer::new(16);
        let payload = b"abcdefgh";
        ring.write(payload, MediaTime::from_millis(1), false)
            .unwrap();
        assert_eq!(ring.readable_count(), 8);
        assert_eq!(ring.read(8).unwrap(), payload);
        assert_eq!(ring.readable_count(), 0);
        assert_eq!(ring.writable_count(), 16);
    }

    #[test]
    fn readable_plus_writable_is_capacity() {
        let ring = CircularBuffer::new(10);
        ring.write(&[1; 7], MediaTime::ZERO, false).unwrap();
        ring.read(3).unwrap();
        ring.write(&[2; 5], MediaTime::ZERO, false).unwrap();
        ring.skip(4).unwrap();
        assert_eq!(ring.readable_count() + ring.writable_count(), 10);
        assert!(ring.read_index() < 10);
        assert!(ring.write_index() < 10);
    }

    #[test]
    fn wrapping_write_preserves_indices() {
        // Scenario: capacity 10, write 7, read 3, write 5 without overwrite.
        let ring = CircularBuffer::new(10);
        ring.write(&[1; 7], MediaTime::from_millis(1), false)
            .unwrap();
        ring.read(3).unwrap();
        ring.write(&[2; 5], MediaTime::from_millis(2), false)
            .unwrap();
        assert_eq!(ring.write_index(), 2);
        assert_eq!(ring.read_index(), 3);
        assert_eq!(ring.readable_count(), 9);
        assert_eq!(ring.write_tag(), MediaTime::from_millis(2));
        assert_eq!(ring.rewindable_count(), 1);
    }

    #[test]
    fn full_write_without_overwrite_reports_no_room() {
        let ring = CircularBuffer::new(4);
        ring.write(&[1; 3], MediaTime::ZERO, false).unwrap();
        let err = ring.write(&[2; 2], MediaTime::ZERO, false).unwrap_err();
        assert_eq!(
            err,
            PlaybackError::NoRoom {
                requested: 2,
                writable: 1
            }
        );
        // The failed write must not move the tag.
        assert_eq!(ring.write_tag(), MediaTime::ZERO);
    }

    #[test]
    fn overwrite_drops_oldest_bytes() {
        let ring = CircularBuffer::new(4);
        ring.write(&[1, 2, 3, 4], MediaTime::ZERO, false).unwrap();
        ring.write(&[5, 6], MediaTime::ZERO, true).unwrap();
        assert_eq!(ring.readable_count(), 4);
        assert_eq!(ring.read(4).unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn rewind_restores_read_bytes() {
        let ring = CircularBuffer::new(8);
        ring.write(&[1, 2, 3, 4, 5], MediaTime::ZERO, false).unwrap();
        ring.read(4).unwrap();
        ring.rewind(2).unwrap();
        assert_eq!(ring.read(2).unwrap(), vec![3, 4]);
        let err = ring.rewind(5).unwrap_err();
        assert!(matches!(err, PlaybackError::NotEnoughData { .. }));
    }

    #[test]
    fn clear_resets_tag_to_never() {
        let ring = CircularBuffer::new(8);
        ring.write(&[9; 4], MediaTime::from_millis(7), false)
            .unwrap();
        ring.clear();
        assert_eq!(ring.readable_count(), 0);
        assert_eq!(ring.read_index(), 0);
        assert_eq!(ring.write_index(), 0);
        assert_eq!(ring.write_tag(), MediaTime::MIN);
    }

    #[test]
    fn disposed_buffer_rejects_operations() {
        let ring = CircularBuffer::new(8);
        ring.dispose();
        assert_eq!(ring.length(), 0);
        assert_eq!(ring.readable_count(), 0);
        assert!(matches!(
            ring.write(&[1], MediaTime::ZERO, false),
            Err(PlaybackError::Disposed(_))
        ));
        assert!(matches!(ring.read(1), Err(PlaybackError::Disposed(_))));
    }
}
