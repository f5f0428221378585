//! Decoded media blocks and the frame-to-block conversion contract.

use crate::time::MediaTime;
use crate::tools::atomics::{AtomicCounter, AtomicFlag};

/// The media kinds coordinated by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Audio, MediaKind::Video, MediaKind::Subtitle];

    pub fn name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Subtitle => "subtitle",
        }
    }
}

/// Kind-specific decoded payload held by a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BlockPayload {
    /// Pooled block awaiting a fill.
    #[default]
    Empty,
    Video {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        samples: Vec<u8>,
    },
    Subtitle {
        lines: Vec<String>,
    },
}

/// A decoded frame descriptor handed from the decoder to the converter.
///
/// The decoder library owns frame production; this is the view of one frame
/// the coordination core needs in order to buffer it.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub kind: MediaKind,
    pub start_time: MediaTime,
    pub duration: MediaTime,
    pub compressed_size: usize,
    pub payload: BlockPayload,
}

/// Converts a decoded frame into a pooled block.
///
/// The converter fills the block's timing, payload, and compressed size and
/// reports whether the fill succeeded. Ordering and index assignment stay
/// with the block buffer.
pub trait FrameConverter: Send + Sync {
    fn convert(&self, frame: &SourceFrame, block: &mut MediaBlock) -> bool;
}

/// A fully decoded unit of media, immutable once filled into a buffer.
#[derive(Debug)]
pub struct MediaBlock {
    pub kind: MediaKind,
    pub start_time: MediaTime,
    pub duration: MediaTime,
    pub compressed_size: usize,
    pub payload: BlockPayload,
    index: AtomicCounter,
    disposed: AtomicFlag,
}

impl MediaBlock {
    /// Create an empty pooled block for `kind`.
    pub fn empty(kind: MediaKind) -> Self {
        Self {
            kind,
            start_time: MediaTime::ZERO,
            duration: MediaTime::ZERO,
            compressed_size: 0,
            payload: BlockPayload::Empty,
            index: AtomicCounter::new(0),
            disposed: AtomicFlag::new(false),
        }
    }

    pub fn end_time(&self) -> MediaTime {
        self.start_time + self.duration
    }

    /// Whether `position` falls inside `[start_time, end_time)`.
    pub fn contains(&self, position: MediaTime) -> bool {
        position >= self.start_time && position < self.end_time()
    }

    /// Position of this block within its buffer's playback sequence.
    pub fn index(&self) -> usize {
        self.index.value().max(0) as usize
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.set(index as i64);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.value()
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.set(true);
    }

    /// Return the block to its pooled state, keeping the allocation.
    pub(crate) fn reset(&mut self) {
        self.start_time = MediaTime::ZERO;
        self.duration = MediaTime::ZERO;
        self.compressed_size = 0;
        match &mut self.payload {
            BlockPayload::Video { pixels, .. } => pixels.clear(),
            BlockPayload::Audio { samples, .. } => samples.clear(),
            BlockPayload::Subtitle { lines } => lines.clear(),
            BlockPayload::Empty => {}
        }
        self.index.set(0);
        self.disposed.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_interval_is_half_open() {
        let mut block = MediaBlock::empty(MediaKind::Video);
        block.start_time = MediaTime::from_millis(100);
        block.duration = MediaTime::from_millis(40);
        assert_eq!(block.end_time(), MediaTime::from_millis(140));
        assert!(block.contains(MediaTime::from_millis(100)));
        assert!(block.contains(MediaTime::from_millis(139)));
        assert!(!block.contains(MediaTime::from_millis(140)));
    }

    #[test]
    fn reset_keeps_payload_allocation_shape() {
        let mut block = MediaBlock::empty(MediaKind::Audio);
        block.start_time = MediaTime::from_millis(5);
        block.payload = BlockPayload::Audio {
            sample_rate: 48_000,
            channels: 2,
            samples: vec![1, 2, 3],
        };
        block.reset();
        assert_eq!(block.start_time, MediaTime::ZERO);
        match block.payload {
            BlockPayload::Audio { ref samples, .. } => assert!(samples.is_empty()),
            _ => panic!("payload variant should survive reset"),
        }
    }
}
