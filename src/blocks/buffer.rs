//! Pooled, sorted, time-indexed buffer of media blocks.
//!
//! Blocks cycle between a pool of reusable allocations and a playback
//! sequence sorted by start time. Renderers receive `Arc` handles so an
//! evicted block stays readable until its last consumer drops it; eviction
//! recovers the allocation when the handle is unique.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::blocks::block::{FrameConverter, MediaBlock, MediaKind, SourceFrame};
use crate::constants::NON_MONOTONIC_CONTINUITY_GAP;
use crate::time::MediaTime;
use crate::tools::atomics::AtomicFlag;
use crate::tools::locking::SyncLocker;

/// Cached values derived from the playback sequence.
#[derive(Debug, Clone, Copy, Default)]
struct BufferDerived {
    count: usize,
    range_start: MediaTime,
    range_end: MediaTime,
    range_duration: MediaTime,
    range_mid: MediaTime,
    range_bitrate: u64,
    average_block_duration: MediaTime,
    is_monotonic: bool,
    monotonic_duration: MediaTime,
    capacity_percent: f64,
    is_full: bool,
}

#[derive(Debug, Default)]
struct BufferState {
    pool: VecDeque<MediaBlock>,
    playback: Vec<Arc<MediaBlock>>,
    derived: BufferDerived,
}

/// A per-kind buffer of decoded blocks with fast timestamp lookup.
#[derive(Debug)]
pub struct BlockBuffer {
    kind: MediaKind,
    capacity: usize,
    state: SyncLocker<BufferState>,
    disposed: AtomicFlag,
}

impl BlockBuffer {
    /// Create a buffer whose pool holds `capacity` preallocated blocks.
    pub fn new(capacity: usize, kind: MediaKind) -> Self {
        assert!(capacity > 0, "block buffer capacity must be positive");
        let pool = (0..capacity).map(|_| MediaBlock::empty(kind)).collect();
        Self {
            kind,
            capacity,
            state: SyncLocker::new(BufferState {
                pool,
                playback: Vec::with_capacity(capacity),
                derived: BufferDerived::default(),
            }),
            disposed: AtomicFlag::new(false),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.value()
    }

    /// Convert `frame` into a pooled block and append it to playback.
    ///
    /// # Arguments
    ///
    /// * `frame` - Decoded frame descriptor to materialize.
    /// * `converter` - Fills the block's timing and payload from `frame`.
    ///
    /// # Returns
    ///
    /// The block now owned by playback, or `None` when the converter
    /// rejected the frame or the buffer is disposed.
    pub fn add(
        &self,
        frame: &SourceFrame,
        converter: &dyn FrameConverter,
    ) -> Option<Arc<MediaBlock>> {
        if self.disposed.value() {
            return None;
        }
        let mut state = self.state.write();

        // A frame landing inside the buffered range replaces any block that
        // starts at the identical timestamp.
        if state.derived.count > 0
            && frame.start_time >= state.derived.range_start
            && frame.start_time <= state.derived.range_end
        {
            if let Ok(existing) = state
                .playback
                .binary_search_by_key(&frame.start_time, |b| b.start_time)
            {
                let evicted = state.playback.remove(existing);
                let recycled = Self::recycle(evicted, self.kind);
                state.pool.push_back(recycled);
            }
        }

        if state.pool.is_empty() {
            let evicted = state.playback.remove(0);
            let recycled = Self::recycle(evicted, self.kind);
            state.pool.push_back(recycled);
        }

        let mut block = state
            .pool
            .pop_front()
            .unwrap_or_else(|| MediaBlock::empty(self.kind));
        if !converter.convert(frame, &mut block) {
            state.pool.push_back(block);
            return None;
        }

        let needs_sort = state
            .playback
            .last()
            .map(|tail| block.start_time < tail.start_time)
            .unwrap_or(false);
        let handle = Arc::new(block);
        state.playback.push(handle.clone());
        if needs_sort {
            state.playback.sort_by_key(|b| b.start_time);
        }
        for (index, block) in state.playback.iter().enumerate() {
            block.set_index(index);
        }

        state.derived = Self::compute_derived(&state.playback, self.capacity);
        Some(handle)
    }

    /// Move every playback block back to the pool.
    pub fn clear(&self) {
        if self.disposed.value() {
            return;
        }
        let mut state = self.state.write();
        let playback = std::mem::take(&mut state.playback);
        for block in playback {
            let recycled = Self::recycle(block, self.kind);
            state.pool.push_back(recycled);
        }
        state.derived = BufferDerived::default();
    }

    /// Dispose all blocks and reject further use.
    pub fn dispose(&self) {
        if self.disposed.exchange(true) {
            return;
        }
        let mut state = self.state.write();
        for block in &state.playback {
            block.mark_disposed();
        }
        state.playback.clear();
        state.pool.clear();
        state.derived = BufferDerived::default();
    }

    /// Index of the block governing `position`.
    ///
    /// Clamps to the first block when `position` precedes the range and the
    /// last block when it exceeds it; `None` only when empty.
    pub fn index_of(&self, position: MediaTime) -> Option<usize> {
        let state = self.state.read();
        Self::locate(&state.playback, position)
    }

    /// Block at playback index `index`.
    pub fn at(&self, index: usize) -> Option<Arc<MediaBlock>> {
        self.state.read().playback.get(index).cloned()
    }

    /// Block governing `position`, with range clamping.
    pub fn block_at(&self, position: MediaTime) -> Option<Arc<MediaBlock>> {
        let state = self.state.read();
        Self::locate(&state.playback, position).map(|i| state.playback[i].clone())
    }

    /// Block following `block` in playback order.
    pub fn next(&self, block: &MediaBlock) -> Option<Arc<MediaBlock>> {
        let state = self.state.read();
        let index = Self::position_of(&state.playback, block)?;
        state.playback.get(index + 1).cloned()
    }

    /// Block preceding `block` in playback order.
    pub fn previous(&self, block: &MediaBlock) -> Option<Arc<MediaBlock>> {
        let state = self.state.read();
        let index = Self::position_of(&state.playback, block)?;
        index.checked_sub(1).and_then(|i| state.playback.get(i)).cloned()
    }

    /// Both neighbors of `block`.
    pub fn neighbors(
        &self,
        block: &MediaBlock,
    ) -> (Option<Arc<MediaBlock>>, Option<Arc<MediaBlock>>) {
        let state = self.state.read();
        match Self::position_of(&state.playback, block) {
            Some(index) => (
                index.checked_sub(1).and_then(|i| state.playback.get(i)).cloned(),
                state.playback.get(index + 1).cloned(),
            ),
            None => (None, None),
        }
    }

    /// The next block only when it starts close enough to `block`'s end to
    /// count as continuous playback.
    pub fn continuous_next(&self, block: &MediaBlock) -> Option<Arc<MediaBlock>> {
        let state = self.state.read();
        let index = Self::position_of(&state.playback, block)?;
        let next = state.playback.get(index + 1)?.clone();
        let limit = if state.derived.is_monotonic {
            MediaTime::from_micros(state.derived.monotonic_duration.as_micros() / 2)
        } else {
            NON_MONOTONIC_CONTINUITY_GAP
        };
        let gap = next.start_time - block.end_time();
        if gap <= limit {
            Some(next)
        } else {
            None
        }
    }

    pub fn is_in_range(&self, position: MediaTime) -> bool {
        let derived = self.derived();
        derived.count > 0 && position >= derived.range_start && position <= derived.range_end
    }

    /// Fraction of the buffered range that `position` has consumed.
    ///
    /// Values below `0` or above `1` mean the clock drifted outside the
    /// buffered window.
    pub fn range_percent(&self, position: MediaTime) -> f64 {
        let derived = self.derived();
        if derived.range_duration <= MediaTime::ZERO {
            return 0.0;
        }
        (position - derived.range_start).as_micros() as f64
            / derived.range_duration.as_micros() as f64
    }

    /// Nearest block start to snap a drifting position onto.
    pub fn snap_position(&self, position: MediaTime) -> MediaTime {
        self.block_at(position)
            .map(|block| block.start_time)
            .unwrap_or(position)
    }

    pub fn count(&self) -> usize {
        self.derived().count
    }

    pub fn pool_count(&self) -> usize {
        self.state.read().pool.len()
    }

    pub fn range_start(&self) -> MediaTime {
        self.derived().range_start
    }

    pub fn range_end(&self) -> MediaTime {
        self.derived().range_end
    }

    pub fn range_duration(&self) -> MediaTime {
        self.derived().range_duration
    }

    pub fn range_mid(&self) -> MediaTime {
        self.derived().range_mid
    }

    /// Bits per second of compressed source data across the buffered range.
    pub fn range_bitrate(&self) -> u64 {
        self.derived().range_bitrate
    }

    pub fn average_block_duration(&self) -> MediaTime {
        self.derived().average_block_duration
    }

    /// Whether every buffered block has the same duration.
    pub fn is_monotonic(&self) -> bool {
        self.derived().is_monotonic
    }

    pub fn monotonic_duration(&self) -> MediaTime {
        self.derived().monotonic_duration
    }

    pub fn capacity_percent(&self) -> f64 {
        self.derived().capacity_percent
    }

    pub fn is_full(&self) -> bool {
        self.derived().is_full
    }

    fn derived(&self) -> BufferDerived {
        self.state.read().derived
    }

    fn locate(playback: &[Arc<MediaBlock>], position: MediaTime) -> Option<usize> {
        if playback.is_empty() {
            return None;
        }
        if position <= playback[0].start_time {
            return Some(0);
        }
        let last = playback.len() - 1;
        if position >= playback[last].end_time() {
            return Some(last);
        }
        // Greatest block whose start does not exceed the position.
        let upper = playback.partition_point(|b| b.start_time <= position);
        Some(upper.saturating_sub(1))
    }

    fn position_of(playback: &[Arc<MediaBlock>], block: &MediaBlock) -> Option<usize> {
        let index = playback
            .binary_search_by_key(&block.start_time, |b| b.start_time)
            .ok()?;
        (playback[index].start_time == block.start_time).then_some(index)
    }

    fn recycle(block: Arc<MediaBlock>, kind: MediaKind) -> MediaBlock {
        match Arc::try_unwrap(block) {
            Ok(mut owned) => {
                owned.reset();
                owned
            }
            // A renderer still holds the handle; give the pool a fresh block
            // so the capacity accounting stays exact.
            Err(_) => MediaBlock::empty(kind),
        }
    }

    fn compute_derived(playback: &[Arc<MediaBlock>], capacity: usize) -> BufferDerived {
        if playback.is_empty() {
            return BufferDerived::default();
        }
        let count = playback.len();
        let range_start = playback[0].start_time;
        let range_end = playback[count - 1].end_time();
        let range_duration = range_end - range_start;
        let range_mid =
            range_start + MediaTime::from_micros(range_duration.as_micros() / 2);

        let duration_sum: i64 = playback.iter().map(|b| b.duration.as_micros()).sum();
        let compressed_sum: u64 = playback.iter().map(|b| b.compressed_size as u64).sum();
        let range_bitrate = if range_duration <= MediaTime::ZERO || count <= 1 {
            0
        } else {
            compressed_sum * 8 * 1_000_000 / range_duration.as_micros() as u64
        };

        let first_duration = playback[0].duration;
        let is_monotonic = playback.iter().all(|b| b.duration == first_duration);

        BufferDerived {
            count,
            range_start,
            range_end,
            range_duration,
            range_mid,
            range_bitrate,
            average_block_duration: MediaTime::from_micros(duration_sum / count as i64),
            is_monotonic,
            monotonic_duration: if is_monotonic {
                first_duration
            } else {
                MediaTime::ZERO
            },
            capacity_percent: count as f64 / capacity as f64,
            is_full: count >= capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::block::BlockPayload;

    struct CopyConverter;

    impl FrameConverter for CopyConverter {
        fn convert(&self, frame: &SourceFrame, block: &mut MediaBlock) -> bool {
            block.start_time = frame.start_time;
            block.duration = frame.duration;
            block.compressed_size = frame.compressed_size;
            block.payload = frame.payload.clone();
            true
        }
    }

    struct RejectingConverter;

    impl FrameConverter for RejectingConverter {
        fn convert(&self, _frame: &SourceFrame, _block: &mut MediaBlock) -> bool {
            false
        }
    }

    fn frame(start_ms: i64, duration_ms: i64) -> SourceFrame {
        SourceFrame {
            kind: MediaKind::Video,
            start_time: MediaTime::from_millis(start_ms),
            duration: MediaTime::from_millis(duration_ms),
            compressed_size: 1_000,
            payload: BlockPayload::Empty,
        }
    }

    fn filled(capacity: usize, starts_ms: &[i64], duration_ms: i64) -> BlockBuffer {
        let buffer = BlockBuffer::new(capacity, MediaKind::Video);
        for &start in starts_ms {
            buffer.add(&frame(start, duration_ms), &CopyConverter).unwrap();
        }
        buffer
    }

    fn assert_consistent(buffer: &BlockBuffer) {
        assert_eq!(buffer.pool_count() + buffer.count(), buffer.capacity());
        let mut previous: Option<MediaTime> = None;
        for index in 0..buffer.count() {
            let block = buffer.at(index).unwrap();
            assert_eq!(block.index(), index);
            if let Some(prev_start) = previous {
                assert!(prev_start < block.start_time);
            }
            previous = Some(block.start_time);
        }
    }

    #[test]
    fn preallocates_the_pool() {
        let buffer = BlockBuffer::new(8, MediaKind::Audio);
        assert_eq!(buffer.pool_count(), 8);
        assert_eq!(buffer.count(), 0);
        assert_eq!(buffer.range_start(), MediaTime::ZERO);
    }

    #[test]
    fn add_keeps_sequence_sorted_and_indexed() {
        let buffer = filled(8, &[0, 40, 20, 60], 20);
        assert_consistent(&buffer);
        assert_eq!(buffer.count(), 4);
        assert_eq!(buffer.at(1).unwrap().start_time, MediaTime::from_millis(20));
        assert_eq!(buffer.range_start(), MediaTime::ZERO);
        assert_eq!(buffer.range_end(), MediaTime::from_millis(80));
    }

    #[test]
    fn add_evicts_identical_start_within_range() {
        let buffer = filled(8, &[0, 20, 40], 20);
        buffer.add(&frame(20, 20), &CopyConverter).unwrap();
        assert_eq!(buffer.count(), 3);
        assert_consistent(&buffer);
    }

    #[test]
    fn add_evicts_oldest_when_pool_is_empty() {
        let buffer = filled(3, &[0, 20, 40], 20);
        assert!(buffer.is_full());
        buffer.add(&frame(60, 20), &CopyConverter).unwrap();
        assert_eq!(buffer.count(), 3);
        assert_eq!(buffer.range_start(), MediaTime::from_millis(20));
        assert_consistent(&buffer);
    }

    #[test]
    fn converter_failure_returns_block_to_pool() {
        let buffer = BlockBuffer::new(4, MediaKind::Video);
        assert!(buffer.add(&frame(0, 20), &RejectingConverter).is_none());
        assert_eq!(buffer.pool_count(), 4);
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn clear_returns_all_blocks_to_pool() {
        let buffer = filled(4, &[0, 20, 40], 20);
        buffer.clear();
        assert_eq!(buffer.count(), 0);
        assert_eq!(buffer.pool_count(), 4);
        assert_eq!(buffer.range_duration(), MediaTime::ZERO);
    }

    #[test]
    fn lookup_clamps_to_range_edges() {
        let buffer = filled(8, &[100, 120, 140], 20);
        assert_eq!(buffer.index_of(MediaTime::from_millis(0)), Some(0));
        assert_eq!(buffer.index_of(MediaTime::from_millis(500)), Some(2));
        assert_eq!(buffer.index_of(MediaTime::from_millis(125)), Some(1));
        let empty = BlockBuffer::new(2, MediaKind::Video);
        assert_eq!(empty.index_of(MediaTime::ZERO), None);
        assert!(empty.block_at(MediaTime::ZERO).is_none());
    }

    #[test]
    fn neighbors_follow_playback_order() {
        let buffer = filled(8, &[0, 20, 40], 20);
        let middle = buffer.at(1).unwrap();
        let (prev, next) = buffer.neighbors(&middle);
        assert_eq!(prev.unwrap().start_time, MediaTime::ZERO);
        assert_eq!(next.unwrap().start_time, MediaTime::from_millis(40));
        let first = buffer.at(0).unwrap();
        assert!(buffer.previous(&first).is_none());
    }

    #[test]
    fn continuous_next_rejects_wide_gaps() {
        // Monotonic: all 20 ms blocks, so gaps up to 10 ms are continuous.
        let buffer = filled(8, &[0, 20, 45], 20);
        let first = buffer.at(0).unwrap();
        assert!(buffer.continuous_next(&first).is_some());
        let second = buffer.at(1).unwrap();
        assert!(buffer.continuous_next(&second).is_none());
    }

    #[test]
    fn range_percent_signals_drift() {
        let buffer = filled(8, &[0, 20, 40], 20);
        assert!(buffer.range_percent(MediaTime::from_millis(-10)) < 0.0);
        assert!(buffer.range_percent(MediaTime::from_millis(90)) > 1.0);
        let mid = buffer.range_percent(buffer.range_mid());
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bitrate_needs_at_least_two_blocks() {
        let buffer = filled(8, &[0], 20);
        assert_eq!(buffer.range_bitrate(), 0);
        buffer.add(&frame(20, 20), &CopyConverter).unwrap();
        // 2 blocks x 1000 bytes over 40 ms = 400_000 bits/s.
        assert_eq!(buffer.range_bitrate(), 400_000);
    }

    #[test]
    fn monotonic_tracks_uniform_durations() {
        let buffer = filled(8, &[0, 20], 20);
        assert!(buffer.is_monotonic());
        assert_eq!(buffer.monotonic_duration(), MediaTime::from_millis(20));
        buffer.add(&frame(40, 30), &CopyConverter).unwrap();
        assert!(!buffer.is_monotonic());
        assert_eq!(buffer.monotonic_duration(), MediaTime::ZERO);
    }

    #[test]
    fn capacity_survives_external_block_handles() {
        let buffer = filled(2, &[0, 20], 20);
        let held = buffer.at(0).unwrap();
        buffer.add(&frame(40, 20), &CopyConverter).unwrap();
        assert_consistent(&buffer);
        // The held handle still reads even though its block was evicted.
        assert_eq!(held.start_time, MediaTime::ZERO);
    }

    #[test]
    fn dispose_marks_blocks_and_rejects_adds() {
        let buffer = filled(4, &[0, 20], 20);
        let held = buffer.at(0).unwrap();
        buffer.dispose();
        assert!(buffer.is_disposed());
        assert!(held.is_disposed());
        assert!(buffer.add(&frame(40, 20), &CopyConverter).is_none());
        assert_eq!(buffer.count(), 0);
    }
}
