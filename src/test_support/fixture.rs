//! Pre-wired collaborator sets for pipeline tests.

use std::sync::Arc;

use crate::blocks::MediaKind;
use crate::container::MediaOptions;
use crate::playback::context::{KindMap, PlaybackContext};
use crate::test_support::fakes::{
    CountingRenderer, ManualCommands, PassthroughConverter, RecordingReporter, ScriptedContainer,
};
use crate::time::MediaTime;
use crate::timing::{TimingController, TimingSetup};

/// A fully wired playback context over scripted collaborators.
pub struct Fixture {
    pub container: Arc<ScriptedContainer>,
    pub converter: Arc<PassthroughConverter>,
    pub commands: Arc<ManualCommands>,
    pub state: Arc<RecordingReporter>,
    pub audio_renderer: Arc<CountingRenderer>,
    pub video_renderer: Arc<CountingRenderer>,
    pub subtitle_renderer: Arc<CountingRenderer>,
    pub options: Arc<MediaOptions>,
    pub timing: Arc<TimingController>,
    pub context: Arc<PlaybackContext>,
}

impl Fixture {
    /// Audio + video media with video as the main component and connected
    /// clocks starting at zero.
    pub fn audio_video() -> Self {
        Self::audio_video_with_options(MediaOptions::new())
    }

    pub fn audio_video_with_options(options: MediaOptions) -> Self {
        let container = Arc::new(ScriptedContainer::new(
            MediaKind::Video,
            &[MediaKind::Audio, MediaKind::Video],
        ));
        Self::assemble(container, options)
    }

    /// Audio-only media, main audio.
    pub fn audio_only() -> Self {
        let container = Arc::new(ScriptedContainer::new(
            MediaKind::Audio,
            &[MediaKind::Audio],
        ));
        Self::assemble(container, MediaOptions::new())
    }

    /// Audio + video + subtitles, main video.
    pub fn audio_video_subtitle() -> Self {
        let container = Arc::new(ScriptedContainer::new(
            MediaKind::Video,
            &[MediaKind::Audio, MediaKind::Video, MediaKind::Subtitle],
        ));
        Self::assemble(container, MediaOptions::new())
    }

    fn assemble(container: Arc<ScriptedContainer>, options: MediaOptions) -> Self {
        let converter = Arc::new(PassthroughConverter::new());
        let commands = Arc::new(ManualCommands::new());
        let state = Arc::new(RecordingReporter::new());
        let audio_renderer = Arc::new(CountingRenderer::new());
        let video_renderer = Arc::new(CountingRenderer::new());
        let subtitle_renderer = Arc::new(CountingRenderer::new());
        let options = Arc::new(options);
        let timing = Arc::new(TimingController::new());

        use crate::container::{MediaComponent, MediaContainer};

        let has_audio = container.kinds().contains(&MediaKind::Audio);
        let has_video = container.kinds().contains(&MediaKind::Video);
        let audio_start = if has_audio {
            container.scripted_component(MediaKind::Audio).start_time()
        } else {
            MediaTime::ZERO
        };
        let video_start = if has_video {
            container.scripted_component(MediaKind::Video).start_time()
        } else {
            MediaTime::ZERO
        };
        let disconnected = timing.setup(TimingSetup {
            main: container.main_kind(),
            has_audio,
            has_video,
            audio_start,
            video_start,
            is_live_stream: container.is_live_stream(),
            time_sync_disabled: options.is_time_sync_disabled(),
        });
        if disconnected {
            options.set_time_sync_disabled(true);
        }

        let mut renderers = KindMap::new();
        if has_audio {
            renderers.insert(
                MediaKind::Audio,
                audio_renderer.clone() as Arc<dyn crate::container::BlockRenderer>,
            );
        }
        if has_video {
            renderers.insert(
                MediaKind::Video,
                video_renderer.clone() as Arc<dyn crate::container::BlockRenderer>,
            );
        }
        if container.kinds().contains(&MediaKind::Subtitle) {
            renderers.insert(
                MediaKind::Subtitle,
                subtitle_renderer.clone() as Arc<dyn crate::container::BlockRenderer>,
            );
        }

        let context = Arc::new(PlaybackContext::new(
            container.clone(),
            renderers,
            converter.clone(),
            commands.clone(),
            state.clone(),
            options.clone(),
            timing.clone(),
        ));

        Self {
            container,
            converter,
            commands,
            state,
            audio_renderer,
            video_renderer,
            subtitle_renderer,
            options,
            timing,
            context,
        }
    }

    /// Fill `kind`'s block buffer with `count` contiguous blocks starting at
    /// `start_ms`, each `duration_ms` long.
    pub fn fill_blocks(&self, kind: MediaKind, start_ms: i64, duration_ms: i64, count: usize) {
        let blocks = self.context.blocks(kind).expect("kind has a block buffer");
        for i in 0..count as i64 {
            let frame = crate::blocks::SourceFrame {
                kind,
                start_time: MediaTime::from_millis(start_ms + i * duration_ms),
                duration: MediaTime::from_millis(duration_ms),
                compressed_size: 1_000,
                payload: crate::blocks::BlockPayload::Empty,
            };
            blocks.add(&frame, self.converter.as_ref());
        }
    }
}
