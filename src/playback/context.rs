//! Shared state the three pipeline workers coordinate through.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::blocks::{BlockBuffer, FrameConverter, MediaKind};
use crate::constants::{AUDIO_BLOCK_CAPACITY, SUBTITLE_BLOCK_CAPACITY, VIDEO_BLOCK_CAPACITY};
use crate::container::{BlockRenderer, CommandManager, MediaContainer, MediaOptions, StateReporter};
use crate::time::MediaTime;
use crate::timing::TimingController;
use crate::tools::atomics::{AtomicFlag, AtomicTimeCell};

/// A small per-kind table.
#[derive(Debug, Default)]
pub struct KindMap<T> {
    audio: Option<T>,
    video: Option<T>,
    subtitle: Option<T>,
}

impl<T> KindMap<T> {
    pub fn new() -> Self {
        Self {
            audio: None,
            video: None,
            subtitle: None,
        }
    }

    pub fn insert(&mut self, kind: MediaKind, value: T) {
        match kind {
            MediaKind::Audio => self.audio = Some(value),
            MediaKind::Video => self.video = Some(value),
            MediaKind::Subtitle => self.subtitle = Some(value),
        }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&T> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Subtitle => self.subtitle.as_ref(),
        }
    }
}

/// Everything the packet-reading, frame-decoding, and block-rendering
/// workers share for one open media.
pub struct PlaybackContext {
    pub container: Arc<dyn MediaContainer>,
    pub options: Arc<MediaOptions>,
    pub converter: Arc<dyn FrameConverter>,
    pub commands: Arc<dyn CommandManager>,
    pub state: Arc<dyn StateReporter>,
    pub timing: Arc<TimingController>,
    blocks: KindMap<Arc<BlockBuffer>>,
    renderers: KindMap<Arc<dyn BlockRenderer>>,
    /// Subtitle blocks loaded ahead of playback from a side file; when set,
    /// subtitle rendering reads these instead of the decoded buffer.
    preloaded_subtitles: Mutex<Option<Arc<BlockBuffer>>>,
    pub is_sync_buffering: AtomicFlag,
    pub has_decoding_ended: AtomicFlag,
    pub has_initialized: AtomicFlag,
    last_render_time: KindMap<AtomicTimeCell>,
}

impl PlaybackContext {
    pub fn new(
        container: Arc<dyn MediaContainer>,
        renderers: KindMap<Arc<dyn BlockRenderer>>,
        converter: Arc<dyn FrameConverter>,
        commands: Arc<dyn CommandManager>,
        state: Arc<dyn StateReporter>,
        options: Arc<MediaOptions>,
        timing: Arc<TimingController>,
    ) -> Self {
        let mut blocks = KindMap::new();
        let mut last_render_time = KindMap::new();
        for kind in container.kinds() {
            let capacity = match kind {
                MediaKind::Audio => AUDIO_BLOCK_CAPACITY,
                MediaKind::Video => VIDEO_BLOCK_CAPACITY,
                MediaKind::Subtitle => SUBTITLE_BLOCK_CAPACITY,
            };
            blocks.insert(kind, Arc::new(BlockBuffer::new(capacity, kind)));
            last_render_time.insert(kind, AtomicTimeCell::default());
        }
        Self {
            container,
            options,
            converter,
            commands,
            state,
            timing,
            blocks,
            renderers,
            preloaded_subtitles: Mutex::new(None),
            is_sync_buffering: AtomicFlag::new(false),
            has_decoding_ended: AtomicFlag::new(false),
            has_initialized: AtomicFlag::new(false),
            last_render_time,
        }
    }

    pub fn main_kind(&self) -> MediaKind {
        self.container.main_kind()
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.container.kinds()
    }

    pub fn blocks(&self, kind: MediaKind) -> Option<&Arc<BlockBuffer>> {
        self.blocks.get(kind)
    }

    pub fn main_blocks(&self) -> Option<&Arc<BlockBuffer>> {
        self.blocks.get(self.main_kind())
    }

    pub fn renderer(&self, kind: MediaKind) -> Option<&Arc<dyn BlockRenderer>> {
        self.renderers.get(kind)
    }

    pub fn preloaded_subtitles(&self) -> Option<Arc<BlockBuffer>> {
        self.preloaded_subtitles.lock().clone()
    }

    pub fn set_preloaded_subtitles(&self, blocks: Option<Arc<BlockBuffer>>) {
        *self.preloaded_subtitles.lock() = blocks;
    }

    pub fn last_render_time(&self, kind: MediaKind) -> MediaTime {
        self.last_render_time
            .get(kind)
            .map(AtomicTimeCell::value)
            .unwrap_or(MediaTime::MIN)
    }

    pub fn set_last_render_time(&self, kind: MediaKind, value: MediaTime) {
        if let Some(cell) = self.last_render_time.get(kind) {
            cell.set(value);
        }
    }

    /// Reset per-kind duplicate-delivery tracking (after a seek).
    pub fn clear_last_render_times(&self) {
        for kind in MediaKind::ALL {
            if let Some(cell) = self.last_render_time.get(kind) {
                cell.set(MediaTime::MIN);
            }
        }
    }

    fn is_attached_picture(&self, kind: MediaKind) -> bool {
        self.container
            .component(kind)
            .map(|component| component.is_attached_picture())
            .unwrap_or(false)
    }

    /// Kinds that participate in sync-buffering decisions: everything but
    /// the main component, subtitles, and cover-art streams.
    pub fn lagging_candidate_kinds(&self) -> Vec<MediaKind> {
        let main = self.main_kind();
        self.kinds()
            .into_iter()
            .filter(|&kind| {
                kind != main && kind != MediaKind::Subtitle && !self.is_attached_picture(kind)
            })
            .collect()
    }

    /// Whether delivering the same block twice in a row is required for
    /// `kind`. Audio always needs repeats; video only for cover art.
    pub fn requires_repeated_delivery(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => true,
            MediaKind::Video => self.is_attached_picture(MediaKind::Video),
            MediaKind::Subtitle => false,
        }
    }

    /// Whether every lagging component has caught up past the midpoint of
    /// the main buffered range.
    pub fn can_exit_sync_buffering(&self) -> bool {
        let Some(main_blocks) = self.main_blocks() else {
            return true;
        };
        if main_blocks.count() == 0 {
            return false;
        }
        let threshold = main_blocks.range_mid();
        self.lagging_candidate_kinds().into_iter().all(|kind| {
            self.blocks(kind)
                .map(|blocks| blocks.range_end() >= threshold)
                .unwrap_or(true)
        })
    }

    /// Tear down the per-media buffers.
    pub fn dispose(&self) {
        for kind in MediaKind::ALL {
            if let Some(blocks) = self.blocks.get(kind) {
                blocks.dispose();
            }
        }
        if let Some(preloaded) = self.preloaded_subtitles() {
            preloaded.dispose();
        }
    }
}
