//! Host-facing assembly of the playback pipeline.
//!
//! `PlaybackPipeline` wires the external collaborators into a shared
//! context, configures the timing controller for the opened media, and owns
//! the worker set from open to close.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::blocks::{FrameConverter, MediaKind};
use crate::container::{
    BlockRenderer, CommandManager, MediaContainer, MediaOptions, MediaState, StateReporter,
};
use crate::error::PlaybackError;
use crate::playback::context::{KindMap, PlaybackContext};
use crate::playback::workers::MediaWorkerSet;
use crate::time::MediaTime;
use crate::timing::{TimingController, TimingSetup};

pub struct PlaybackPipeline {
    context: Arc<PlaybackContext>,
    workers: MediaWorkerSet,
}

impl PlaybackPipeline {
    /// Wire the collaborators for newly opened media.
    ///
    /// Sets up the timing controller from the container's stream facts; when
    /// the stream starts force disconnected clocks, the decision is written
    /// back into `options`.
    pub fn open(
        container: Arc<dyn MediaContainer>,
        renderers: KindMap<Arc<dyn BlockRenderer>>,
        converter: Arc<dyn FrameConverter>,
        commands: Arc<dyn CommandManager>,
        state: Arc<dyn StateReporter>,
        options: Arc<MediaOptions>,
    ) -> Self {
        let timing = Arc::new(TimingController::new());
        let kinds = container.kinds();
        let start_of = |kind: MediaKind| {
            container
                .component(kind)
                .map(|component| component.start_time())
                .unwrap_or(MediaTime::ZERO)
        };
        let forced_disconnected = timing.setup(TimingSetup {
            main: container.main_kind(),
            has_audio: kinds.contains(&MediaKind::Audio),
            has_video: kinds.contains(&MediaKind::Video),
            audio_start: start_of(MediaKind::Audio),
            video_start: start_of(MediaKind::Video),
            is_live_stream: container.is_live_stream(),
            time_sync_disabled: options.is_time_sync_disabled(),
        });
        if forced_disconnected {
            options.set_time_sync_disabled(true);
        }

        let context = Arc::new(PlaybackContext::new(
            container,
            renderers,
            converter,
            commands,
            state,
            options,
            timing,
        ));
        let workers = MediaWorkerSet::new(context.clone());
        info!("playback pipeline opened");
        Self { context, workers }
    }

    pub fn context(&self) -> &Arc<PlaybackContext> {
        &self.context
    }

    pub fn workers(&self) -> &MediaWorkerSet {
        &self.workers
    }

    /// Spawn the three workers.
    pub fn start(&self) -> Result<(), PlaybackError> {
        self.workers.start()
    }

    /// Request playback: renderers and media state go to `Play`; the
    /// rendering worker starts the clock once enough data is buffered.
    pub fn play(&self) {
        for kind in self.context.kinds() {
            if let Some(renderer) = self.context.renderer(kind) {
                renderer.play();
            }
        }
        self.context.state.update_media_state(MediaState::Play);
    }

    /// Pause playback immediately.
    pub fn pause(&self) {
        self.context.state.update_media_state(MediaState::Pause);
        // An in-flight rendering cycle may have read the old state and be
        // about to restart the clock; let it finish before freezing.
        self.workers
            .wait_for_rendering_cycle(Duration::from_millis(100));
        self.context.timing.pause(None);
        for kind in self.context.kinds() {
            if let Some(renderer) = self.context.renderer(kind) {
                renderer.pause();
            }
        }
    }

    pub fn position(&self) -> MediaTime {
        self.context.timing.position(None)
    }

    pub fn speed_ratio(&self) -> f64 {
        self.context.timing.speed_ratio()
    }

    pub fn set_speed_ratio(&self, ratio: f64) {
        self.context.timing.set_speed_ratio(ratio);
    }

    /// Tear the pipeline down: stop workers, close renderers, dispose
    /// buffers.
    pub fn close(&self) {
        self.workers.dispose();
        for kind in self.context.kinds() {
            if let Some(renderer) = self.context.renderer(kind) {
                renderer.close();
            }
        }
        self.context.dispose();
        self.context.state.update_media_state(MediaState::Close);
        info!("playback pipeline closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fakes::{
        CountingRenderer, ManualCommands, PassthroughConverter, RecordingReporter,
        ScriptedContainer,
    };
    use std::time::{Duration, Instant};

    struct Harness {
        container: Arc<ScriptedContainer>,
        state: Arc<RecordingReporter>,
        audio_renderer: Arc<CountingRenderer>,
        video_renderer: Arc<CountingRenderer>,
        pipeline: PlaybackPipeline,
    }

    fn open_audio_video(options: MediaOptions) -> Harness {
        let container = Arc::new(ScriptedContainer::new(
            MediaKind::Video,
            &[MediaKind::Audio, MediaKind::Video],
        ));
        let state = Arc::new(RecordingReporter::new());
        let audio_renderer = Arc::new(CountingRenderer::new());
        let video_renderer = Arc::new(CountingRenderer::new());
        let mut renderers = KindMap::new();
        renderers.insert(
            MediaKind::Audio,
            audio_renderer.clone() as Arc<dyn BlockRenderer>,
        );
        renderers.insert(
            MediaKind::Video,
            video_renderer.clone() as Arc<dyn BlockRenderer>,
        );
        let pipeline = PlaybackPipeline::open(
            container.clone(),
            renderers,
            Arc::new(PassthroughConverter::new()),
            Arc::new(ManualCommands::new()),
            state.clone(),
            Arc::new(options),
        );
        Harness {
            container,
            state,
            audio_renderer,
            video_renderer,
            pipeline,
        }
    }

    #[test]
    fn open_forces_time_sync_off_for_distant_stream_starts() {
        let container = Arc::new(ScriptedContainer::new(
            MediaKind::Video,
            &[MediaKind::Audio, MediaKind::Video],
        ));
        container
            .scripted_component(MediaKind::Video)
            .set_start_time(MediaTime::from_secs(30));
        let options = Arc::new(MediaOptions::new());
        let pipeline = PlaybackPipeline::open(
            container,
            KindMap::new(),
            Arc::new(PassthroughConverter::new()),
            Arc::new(ManualCommands::new()),
            Arc::new(RecordingReporter::new()),
            options.clone(),
        );
        assert!(options.is_time_sync_disabled());
        assert!(pipeline.context().timing.has_disconnected_clocks());
        pipeline.close();
    }

    #[test]
    fn plays_media_to_the_end() {
        // A short clip: 30 video blocks of 33.333 ms and 45 audio blocks of
        // 23.22 ms, connected clocks, playing at normal speed.
        let harness = open_audio_video(MediaOptions::new());
        let video_frames: Vec<(i64, i64)> =
            (0..30).map(|i| (i * 33_333, 33_333)).collect();
        let audio_frames: Vec<(i64, i64)> =
            (0..45).map(|i| (i * 23_220, 23_220)).collect();
        harness
            .container
            .queue_frames(MediaKind::Video, &video_frames);
        harness
            .container
            .queue_frames(MediaKind::Audio, &audio_frames);

        harness.pipeline.start().unwrap();
        harness.pipeline.play();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !harness.state.has_media_ended() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(harness.state.has_media_ended(), "media never ended");
        assert!(harness.pipeline.context().has_decoding_ended.value());
        assert_eq!(harness.state.media_state(), MediaState::Stop);
        assert_eq!(harness.state.invalidate_calls(), 1);
        // The end position is the last video block's end.
        assert_eq!(
            harness.state.ended_position(),
            MediaTime::from_micros(29 * 33_333 + 33_333)
        );

        // Video deliveries arrive in order without repeats.
        let starts = harness.video_renderer.rendered_starts();
        assert!(!starts.is_empty());
        assert!(starts.windows(2).all(|pair| pair[0] < pair[1]));
        // Audio was delivered repeatedly (its contract) but in order.
        let audio_starts = harness.audio_renderer.rendered_starts();
        assert!(audio_starts.windows(2).all(|pair| pair[0] <= pair[1]));

        harness.pipeline.close();
        assert_eq!(harness.state.media_state(), MediaState::Close);
    }

    #[test]
    fn pause_freezes_the_position() {
        let harness = open_audio_video(MediaOptions::new());
        let frames: Vec<(i64, i64)> = (0..60).map(|i| (i * 33_333, 33_333)).collect();
        harness.container.queue_frames(MediaKind::Video, &frames);
        harness.container.queue_frames(MediaKind::Audio, &frames);

        harness.pipeline.start().unwrap();
        harness.pipeline.play();

        let deadline = Instant::now() + Duration::from_secs(5);
        while harness.pipeline.position() < MediaTime::from_millis(100)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(10));
        }

        harness.pipeline.pause();
        let frozen = harness.pipeline.position();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(harness.pipeline.position(), frozen);
        assert_eq!(harness.state.media_state(), MediaState::Pause);
        harness.pipeline.close();
    }
}
