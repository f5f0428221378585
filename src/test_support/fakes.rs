//! Fake implementations of the collaborator contracts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::blocks::{BlockBuffer, BlockPayload, FrameConverter, MediaBlock, MediaKind, SourceFrame};
use crate::container::{
    BlockRenderer, CommandManager, MediaComponent, MediaContainer, MediaState, SeekMode,
    StateReporter,
};
use crate::error::PlaybackError;
use crate::time::MediaTime;
use crate::tools::atomics::{AtomicCounter, AtomicF64, AtomicFlag, AtomicTimeCell};
use crate::tools::events::WaitEvent;

/// One scripted stream: queued frames plus the metadata the workers read.
pub struct ScriptedComponent {
    kind: MediaKind,
    start_time: AtomicTimeCell,
    attached_picture: AtomicFlag,
    packets_in_codec: AtomicFlag,
    frames: Mutex<VecDeque<SourceFrame>>,
}

impl ScriptedComponent {
    fn new(kind: MediaKind) -> Self {
        let start_time = AtomicTimeCell::default();
        start_time.set(MediaTime::ZERO);
        Self {
            kind,
            start_time,
            attached_picture: AtomicFlag::new(false),
            packets_in_codec: AtomicFlag::new(false),
            frames: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_start_time(&self, start: MediaTime) {
        self.start_time.set(start);
    }

    pub fn set_attached_picture(&self, attached: bool) {
        self.attached_picture.set(attached);
    }

    pub fn set_packets_in_codec(&self, pending: bool) {
        self.packets_in_codec.set(pending);
    }

    pub fn queue_frame(&self, start: MediaTime, duration: MediaTime) {
        let payload = match self.kind {
            MediaKind::Audio => BlockPayload::Audio {
                sample_rate: 48_000,
                channels: 2,
                samples: vec![0; 64],
            },
            MediaKind::Video => BlockPayload::Video {
                width: 16,
                height: 16,
                pixels: vec![0; 64],
            },
            MediaKind::Subtitle => BlockPayload::Subtitle {
                lines: vec!["cue".to_string()],
            },
        };
        self.frames.lock().push_back(SourceFrame {
            kind: self.kind,
            start_time: start,
            duration,
            compressed_size: 1_000,
            payload,
        });
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.lock().len()
    }
}

impl MediaComponent for ScriptedComponent {
    fn buffer_length(&self) -> usize {
        self.frames.lock().len() * 1_024
    }

    fn has_packets_in_codec(&self) -> bool {
        self.packets_in_codec.value()
    }

    fn start_time(&self) -> MediaTime {
        self.start_time.value()
    }

    fn is_attached_picture(&self) -> bool {
        self.attached_picture.value()
    }

    fn receive_next_frame(&self) -> Option<SourceFrame> {
        self.frames.lock().pop_front()
    }
}

/// A demuxer double whose packet pressure is a scripted countdown.
pub struct ScriptedContainer {
    main: MediaKind,
    components: HashMap<MediaKind, Arc<ScriptedComponent>>,
    kinds: Vec<MediaKind>,
    /// `read` calls still required before `has_enough_packets`.
    packet_shortfall: AtomicCounter,
    read_calls: AtomicCounter,
    read_failure: Mutex<Option<String>>,
    buffer_changed: Arc<WaitEvent>,
    live: AtomicFlag,
    playback_end: Mutex<Option<MediaTime>>,
}

impl ScriptedContainer {
    pub fn new(main: MediaKind, kinds: &[MediaKind]) -> Self {
        let components = kinds
            .iter()
            .map(|&kind| (kind, Arc::new(ScriptedComponent::new(kind))))
            .collect();
        Self {
            main,
            components,
            kinds: kinds.to_vec(),
            packet_shortfall: AtomicCounter::new(0),
            read_calls: AtomicCounter::new(0),
            read_failure: Mutex::new(None),
            buffer_changed: Arc::new(WaitEvent::new()),
            live: AtomicFlag::new(false),
            playback_end: Mutex::new(None),
        }
    }

    pub fn scripted_component(&self, kind: MediaKind) -> &Arc<ScriptedComponent> {
        &self.components[&kind]
    }

    /// Queue `(start_us, duration_us)` frames on `kind`.
    pub fn queue_frames(&self, kind: MediaKind, frames: &[(i64, i64)]) {
        let component = self.scripted_component(kind);
        for &(start, duration) in frames {
            component.queue_frame(
                MediaTime::from_micros(start),
                MediaTime::from_micros(duration),
            );
        }
    }

    pub fn set_packet_shortfall(&self, reads_needed: i64) {
        self.packet_shortfall.set(reads_needed);
    }

    pub fn fail_reads_with(&self, message: &str) {
        *self.read_failure.lock() = Some(message.to_string());
    }

    pub fn read_calls(&self) -> i64 {
        self.read_calls.value()
    }

    pub fn set_live(&self, live: bool) {
        self.live.set(live);
    }

    pub fn set_playback_end_time(&self, end: Option<MediaTime>) {
        *self.playback_end.lock() = end;
    }
}

impl MediaContainer for ScriptedContainer {
    fn read(&self) -> Result<(), PlaybackError> {
        self.read_calls.increment();
        if self.packet_shortfall.value() > 0 {
            self.packet_shortfall.decrement();
        }
        self.buffer_changed.complete();
        if let Some(message) = self.read_failure.lock().clone() {
            return Err(PlaybackError::Container(message));
        }
        Ok(())
    }

    fn main_kind(&self) -> MediaKind {
        self.main
    }

    fn kinds(&self) -> Vec<MediaKind> {
        self.kinds.clone()
    }

    fn component(&self, kind: MediaKind) -> Option<Arc<dyn MediaComponent>> {
        self.components
            .get(&kind)
            .map(|component| component.clone() as Arc<dyn MediaComponent>)
    }

    fn has_enough_packets(&self) -> bool {
        self.packet_shortfall.value() <= 0
    }

    fn buffer_length(&self) -> usize {
        self.components
            .values()
            .map(|component| component.buffer_length())
            .sum()
    }

    fn packet_count(&self) -> usize {
        self.components
            .values()
            .map(|component| component.pending_frames())
            .sum()
    }

    fn packet_count_threshold(&self) -> usize {
        16
    }

    fn should_read_more_packets(&self) -> bool {
        self.packet_shortfall.value() > 0
    }

    fn playback_end_time(&self) -> Option<MediaTime> {
        *self.playback_end.lock()
    }

    fn is_live_stream(&self) -> bool {
        self.live.value()
    }

    fn is_stream_seekable(&self) -> bool {
        !self.live.value()
    }

    fn packet_buffer_changed(&self) -> Arc<WaitEvent> {
        self.buffer_changed.clone()
    }
}

/// Converter that copies the frame's fields straight into the block.
pub struct PassthroughConverter {
    reject: AtomicFlag,
}

impl PassthroughConverter {
    pub fn new() -> Self {
        Self {
            reject: AtomicFlag::new(false),
        }
    }

    pub fn reject_next_frames(&self, reject: bool) {
        self.reject.set(reject);
    }
}

impl Default for PassthroughConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameConverter for PassthroughConverter {
    fn convert(&self, frame: &SourceFrame, block: &mut MediaBlock) -> bool {
        if self.reject.value() {
            return false;
        }
        block.start_time = frame.start_time;
        block.duration = frame.duration;
        block.compressed_size = frame.compressed_size;
        block.payload = frame.payload.clone();
        true
    }
}

/// Renderer double that records every delivery.
pub struct CountingRenderer {
    ready_waits: AtomicCounter,
    rendered: Mutex<Vec<(MediaTime, MediaTime)>>,
    updates: AtomicCounter,
}

impl CountingRenderer {
    pub fn new() -> Self {
        Self {
            ready_waits: AtomicCounter::new(0),
            rendered: Mutex::new(Vec::new()),
            updates: AtomicCounter::new(0),
        }
    }

    /// `(block_start, playback_position)` pairs in delivery order.
    pub fn rendered(&self) -> Vec<(MediaTime, MediaTime)> {
        self.rendered.lock().clone()
    }

    pub fn rendered_starts(&self) -> Vec<MediaTime> {
        self.rendered.lock().iter().map(|&(start, _)| start).collect()
    }

    pub fn render_count(&self) -> usize {
        self.rendered.lock().len()
    }

    pub fn update_count(&self) -> i64 {
        self.updates.value()
    }

    pub fn ready_waits(&self) -> i64 {
        self.ready_waits.value()
    }
}

impl Default for CountingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRenderer for CountingRenderer {
    fn wait_for_ready_state(&self) {
        self.ready_waits.increment();
    }

    fn render(&self, block: &MediaBlock, position: MediaTime) {
        self.rendered.lock().push((block.start_time, position));
    }

    fn update(&self, _position: MediaTime) {
        self.updates.increment();
    }
}

/// Command manager double driven directly by tests.
pub struct ManualCommands {
    pending: AtomicFlag,
    seeking: AtomicFlag,
    actively_seeking: AtomicFlag,
    seek_mode: Mutex<SeekMode>,
    seek_blocks_ready: WaitEvent,
    seek_waits: AtomicCounter,
}

impl ManualCommands {
    pub fn new() -> Self {
        Self {
            pending: AtomicFlag::new(false),
            seeking: AtomicFlag::new(false),
            actively_seeking: AtomicFlag::new(false),
            seek_mode: Mutex::new(SeekMode::Normal),
            seek_blocks_ready: WaitEvent::new(),
            seek_waits: AtomicCounter::new(0),
        }
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.set(pending);
    }

    pub fn begin_seek(&self, mode: SeekMode) {
        *self.seek_mode.lock() = mode;
        self.seeking.set(true);
        self.actively_seeking.set(true);
        self.seek_blocks_ready.begin();
    }

    pub fn seek_blocks_available(&self) {
        self.seek_blocks_ready.complete();
    }

    pub fn end_seek(&self) {
        self.seeking.set(false);
        self.actively_seeking.set(false);
        self.seek_blocks_ready.complete();
    }

    pub fn seek_waits(&self) -> i64 {
        self.seek_waits.value()
    }
}

impl Default for ManualCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandManager for ManualCommands {
    fn has_pending_commands(&self) -> bool {
        self.pending.value()
    }

    fn is_seeking(&self) -> bool {
        self.seeking.value()
    }

    fn is_actively_seeking(&self) -> bool {
        self.actively_seeking.value()
    }

    fn active_seek_mode(&self) -> SeekMode {
        *self.seek_mode.lock()
    }

    fn wait_for_seek_blocks(&self, timeout: Duration) -> bool {
        self.seek_waits.increment();
        self.seek_blocks_ready.wait_timeout(timeout)
    }
}

/// State reporter double with inspectable recordings.
pub struct RecordingReporter {
    media_state: Mutex<MediaState>,
    media_ended: AtomicFlag,
    ended_position: AtomicTimeCell,
    invalidate_calls: AtomicCounter,
    buffering_updates: AtomicCounter,
    decoding_bitrate: AtomicCounter,
    dynamic_updates: AtomicCounter,
    positions: Mutex<Vec<MediaTime>>,
    buffering_progress: AtomicF64,
    playback_start_time: AtomicTimeCell,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self {
            media_state: Mutex::new(MediaState::Stop),
            media_ended: AtomicFlag::new(false),
            ended_position: AtomicTimeCell::default(),
            invalidate_calls: AtomicCounter::new(0),
            buffering_updates: AtomicCounter::new(0),
            decoding_bitrate: AtomicCounter::new(0),
            dynamic_updates: AtomicCounter::new(0),
            positions: Mutex::new(Vec::new()),
            buffering_progress: AtomicF64::new(1.0),
            playback_start_time: AtomicTimeCell::default(),
        }
    }

    pub fn set_media_state(&self, state: MediaState) {
        *self.media_state.lock() = state;
    }

    pub fn set_buffering_progress(&self, progress: f64) {
        self.buffering_progress.set(progress);
    }

    pub fn invalidate_calls(&self) -> i64 {
        self.invalidate_calls.value()
    }

    pub fn buffering_stats_updates(&self) -> i64 {
        self.buffering_updates.value()
    }

    pub fn decoding_bitrate(&self) -> i64 {
        self.decoding_bitrate.value()
    }

    pub fn dynamic_updates(&self) -> i64 {
        self.dynamic_updates.value()
    }

    pub fn reported_positions(&self) -> Vec<MediaTime> {
        self.positions.lock().clone()
    }

    pub fn ended_position(&self) -> MediaTime {
        self.ended_position.value()
    }

    pub fn playback_start_time(&self) -> MediaTime {
        self.playback_start_time.value()
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateReporter for RecordingReporter {
    fn update_buffering_stats(&self, _length: usize, _count: usize, _count_threshold: usize) {
        self.buffering_updates.increment();
    }

    fn update_decoding_bitrate(&self, bits_per_second: u64) {
        self.decoding_bitrate.set(bits_per_second as i64);
    }

    fn update_dynamic_block_properties(&self, _block: &MediaBlock, _buffer: &BlockBuffer) {
        self.dynamic_updates.increment();
    }

    fn update_media_ended(&self, ended: bool, position: MediaTime) {
        self.media_ended.set(ended);
        if ended {
            self.ended_position.set(position);
        }
    }

    fn update_media_state(&self, state: MediaState) {
        *self.media_state.lock() = state;
    }

    fn update_playback_start_time(&self, position: MediaTime) {
        self.playback_start_time.set(position);
    }

    fn report_playback_position(&self, position: MediaTime) {
        self.positions.lock().push(position);
    }

    fn invalidate_renderers(&self) {
        self.invalidate_calls.increment();
    }

    fn buffering_progress(&self) -> f64 {
        self.buffering_progress.value()
    }

    fn media_state(&self) -> MediaState {
        *self.media_state.lock()
    }

    fn has_media_ended(&self) -> bool {
        self.media_ended.value()
    }
}
