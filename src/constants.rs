//! Shared constants for playback coordination defaults.

use std::time::Duration;

use crate::time::MediaTime;

/// Maximum permissible start-time difference between audio and video before
/// the timing controller falls back to disconnected clocks.
pub const TIME_SYNC_MAX_OFFSET: MediaTime = MediaTime::from_millis(500);

/// Default timeout for timed reader-writer lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Cycle period for the packet-reading and frame-decoding workers.
pub const THREAD_WORKER_PERIOD: Duration = Duration::from_millis(5);

/// Cycle period for the block-rendering worker.
pub const HIGH_PRIORITY_PERIOD: Duration = Duration::from_millis(15);

/// Default clock speed ratio.
pub const DEFAULT_SPEED_RATIO: f64 = 1.0;

/// Slice the packet-reading worker waits on the buffer-changed event before
/// re-checking its exit conditions.
pub const BUFFER_CHANGED_WAIT: Duration = Duration::from_millis(15);

/// Maximum gap between non-monotonic neighbor blocks still considered
/// continuous.
pub const NON_MONOTONIC_CONTINUITY_GAP: MediaTime = MediaTime::from_millis(1);

/// Default block-buffer capacities per media kind.
pub const AUDIO_BLOCK_CAPACITY: usize = 64;
pub const VIDEO_BLOCK_CAPACITY: usize = 16;
pub const SUBTITLE_BLOCK_CAPACITY: usize = 32;
