//! Contracts for the external collaborators the coordination core drives.
//!
//! The demuxer/decoder library, the per-kind renderers, the command manager,
//! and the host's state store all live outside this crate; these traits are
//! the seams the workers call through.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blocks::{BlockBuffer, MediaBlock, MediaKind, SourceFrame};
use crate::error::PlaybackError;
use crate::time::MediaTime;
use crate::tools::atomics::AtomicFlag;
use crate::tools::events::WaitEvent;

pub use crate::blocks::FrameConverter;

/// Host-visible transport state of the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaState {
    Stop,
    Play,
    Pause,
    Manual,
    Close,
}

/// How strictly a seek must land on the requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Normal,
    Precise,
}

/// Per-kind stream metadata and decoded-frame access.
pub trait MediaComponent: Send + Sync {
    /// Bytes currently queued in this component's packet buffer.
    fn buffer_length(&self) -> usize;

    /// Whether packets were sent to the codec but not yet drained as frames.
    fn has_packets_in_codec(&self) -> bool;

    /// First-frame timestamp, zero when unknown.
    fn start_time(&self) -> MediaTime;

    /// Whether this is a single-picture cover-art stream.
    fn is_attached_picture(&self) -> bool;

    /// Pull the next decoded frame, if one is ready.
    fn receive_next_frame(&self) -> Option<SourceFrame>;
}

/// The demuxer and its packet queues.
pub trait MediaContainer: Send + Sync {
    /// Pull one packet unit from the container into the packet queues.
    fn read(&self) -> Result<(), PlaybackError>;

    fn main_kind(&self) -> MediaKind;

    /// Kinds present in the media.
    fn kinds(&self) -> Vec<MediaKind>;

    fn component(&self, kind: MediaKind) -> Option<Arc<dyn MediaComponent>>;

    /// Whether all packet queues hold enough data for smooth decoding.
    fn has_enough_packets(&self) -> bool;

    /// Total bytes across all packet queues.
    fn buffer_length(&self) -> usize;

    /// Total packets across all queues.
    fn packet_count(&self) -> usize;

    /// Packet count considered sufficient per component.
    fn packet_count_threshold(&self) -> usize;

    /// Whether the reader should keep pulling packets.
    fn should_read_more_packets(&self) -> bool;

    /// Playback end reported by the container, when known.
    fn playback_end_time(&self) -> Option<MediaTime>;

    fn is_live_stream(&self) -> bool;

    fn is_stream_seekable(&self) -> bool;

    /// Event the demuxer completes whenever a packet queue changes; the
    /// packet-reading worker sleeps on it.
    fn packet_buffer_changed(&self) -> Arc<WaitEvent>;
}

/// Platform renderer for one media kind.
pub trait BlockRenderer: Send + Sync {
    /// Block until the renderer can accept blocks.
    fn wait_for_ready_state(&self) {}

    fn play(&self) {}
    fn pause(&self) {}
    fn stop(&self) {}
    fn seek(&self) {}
    fn close(&self) {}

    /// Deliver a block for presentation at `position`.
    fn render(&self, block: &MediaBlock, position: MediaTime);

    /// Per-cycle position notification, sent whether or not a block was
    /// delivered.
    fn update(&self, position: MediaTime);
}

/// Seek/command coordination owned by the host.
pub trait CommandManager: Send + Sync {
    fn has_pending_commands(&self) -> bool;

    fn is_seeking(&self) -> bool;

    fn is_actively_seeking(&self) -> bool;

    fn active_seek_mode(&self) -> SeekMode;

    /// Wait until seek-target blocks have landed, up to `timeout`.
    ///
    /// Returns `false` when no blocks arrived in time.
    fn wait_for_seek_blocks(&self, timeout: Duration) -> bool;
}

/// Host-side store of observable playback state.
pub trait StateReporter: Send + Sync {
    fn update_buffering_stats(&self, length: usize, count: usize, count_threshold: usize);

    fn update_decoding_bitrate(&self, bits_per_second: u64);

    /// Refresh block-derived properties after a delivery.
    fn update_dynamic_block_properties(&self, block: &MediaBlock, buffer: &BlockBuffer);

    fn update_media_ended(&self, ended: bool, position: MediaTime);

    fn update_media_state(&self, state: MediaState);

    fn update_playback_start_time(&self, position: MediaTime);

    fn report_playback_position(&self, position: MediaTime);

    /// Ask the host to repaint/refresh its renderers.
    fn invalidate_renderers(&self);

    /// Packet buffering progress in `[0, 1]`.
    fn buffering_progress(&self) -> f64;

    fn media_state(&self) -> MediaState;

    fn has_media_ended(&self) -> bool;
}

/// Behavior switches read by the workers every cycle.
///
/// `is_time_sync_disabled` is interior-mutable because the timing controller
/// may force it during setup.
#[derive(Debug)]
pub struct MediaOptions {
    time_sync_disabled: AtomicFlag,
    pub use_parallel_decoding: bool,
    pub use_parallel_rendering: bool,
    /// Minimum packet-buffering progress before playback may resume; zero
    /// disables the gate.
    pub min_playback_buffer_percent: f64,
}

impl MediaOptions {
    pub fn new() -> Self {
        Self {
            time_sync_disabled: AtomicFlag::new(false),
            use_parallel_decoding: false,
            use_parallel_rendering: false,
            min_playback_buffer_percent: 0.0,
        }
    }

    pub fn with_time_sync_disabled(self, disabled: bool) -> Self {
        self.time_sync_disabled.set(disabled);
        self
    }

    pub fn is_time_sync_disabled(&self) -> bool {
        self.time_sync_disabled.value()
    }

    pub fn set_time_sync_disabled(&self, disabled: bool) {
        self.time_sync_disabled.set(disabled);
    }
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_expose_interior_time_sync_flag() {
        let options = MediaOptions::new().with_time_sync_disabled(true);
        assert!(options.is_time_sync_disabled());
        options.set_time_sync_disabled(false);
        assert!(!options.is_time_sync_disabled());
        assert_eq!(options.min_playback_buffer_percent, 0.0);
    }
}
