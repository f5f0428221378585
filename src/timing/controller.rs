//! Mapping from media kinds to real-time clocks and stream-start offsets.
//!
//! Connected mode shares one clock across every kind. Disconnected mode
//! gives audio and video independent clocks (subtitles follow video) so
//! unrelated streams may drift apart without fighting each other.

use std::sync::Arc;

use log::info;

use crate::blocks::MediaKind;
use crate::constants::TIME_SYNC_MAX_OFFSET;
use crate::time::MediaTime;
use crate::timing::clock::RealTimeClock;
use crate::tools::locking::SyncLocker;

/// Stream facts the controller needs to choose its clock topology.
#[derive(Debug, Clone, Copy)]
pub struct TimingSetup {
    pub main: MediaKind,
    pub has_audio: bool,
    pub has_video: bool,
    /// First-frame timestamps; zero when unknown.
    pub audio_start: MediaTime,
    pub video_start: MediaTime,
    pub is_live_stream: bool,
    pub time_sync_disabled: bool,
}

#[derive(Debug)]
struct TimingState {
    audio_clock: Arc<RealTimeClock>,
    /// Same instance as `audio_clock` in connected mode.
    video_clock: Arc<RealTimeClock>,
    audio_offset: MediaTime,
    video_offset: MediaTime,
    subtitle_offset: MediaTime,
    reference_offset: MediaTime,
    reference_kind: MediaKind,
    has_disconnected: bool,
    initialized: bool,
}

impl TimingState {
    fn connected() -> Self {
        let clock = Arc::new(RealTimeClock::new());
        Self {
            audio_clock: clock.clone(),
            video_clock: clock,
            audio_offset: MediaTime::ZERO,
            video_offset: MediaTime::ZERO,
            subtitle_offset: MediaTime::ZERO,
            reference_offset: MediaTime::ZERO,
            reference_kind: MediaKind::Video,
            has_disconnected: false,
            initialized: false,
        }
    }

    fn clock(&self, kind: Option<MediaKind>) -> &Arc<RealTimeClock> {
        match kind.unwrap_or(self.reference_kind) {
            MediaKind::Audio => &self.audio_clock,
            MediaKind::Video | MediaKind::Subtitle => &self.video_clock,
        }
    }

    fn offset(&self, kind: Option<MediaKind>) -> MediaTime {
        match kind {
            Some(MediaKind::Audio) => self.audio_offset,
            Some(MediaKind::Video) => self.video_offset,
            Some(MediaKind::Subtitle) => self.subtitle_offset,
            None => self.reference_offset,
        }
    }

    fn each_clock(&self, mut apply: impl FnMut(&RealTimeClock)) {
        apply(&self.audio_clock);
        if !Arc::ptr_eq(&self.audio_clock, &self.video_clock) {
            apply(&self.video_clock);
        }
    }
}

/// One or two real-time clocks plus per-kind stream-start offsets.
#[derive(Debug)]
pub struct TimingController {
    state: SyncLocker<TimingState>,
}

impl TimingController {
    /// Create a controller in connected mode with zero offsets, usable
    /// before any media has been opened.
    pub fn new() -> Self {
        Self {
            state: SyncLocker::new(TimingState::connected()),
        }
    }

    /// Rebuild the clock table for newly opened media.
    ///
    /// Returns `true` when the controller ends up in disconnected-clock
    /// mode, either because `setup.time_sync_disabled` was set or because
    /// the audio and video stream starts are further apart than
    /// `TIME_SYNC_MAX_OFFSET`; the caller is expected to write that
    /// decision back into the media options.
    pub fn setup(&self, setup: TimingSetup) -> bool {
        let mut state = self.state.write();

        // Keep the transport observable across re-setups.
        let had_prior = state.initialized;
        let prior_speed = state.clock(None).speed_ratio();
        let prior_position = state.clock(None).position() + state.reference_offset;
        let was_running = state.clock(None).is_running();

        let start_gap = if setup.audio_start >= setup.video_start {
            setup.audio_start - setup.video_start
        } else {
            setup.video_start - setup.audio_start
        };
        let force_disconnected =
            setup.has_audio && setup.has_video && start_gap > TIME_SYNC_MAX_OFFSET;
        let disconnected =
            (setup.time_sync_disabled || force_disconnected) && setup.has_audio && setup.has_video;
        if force_disconnected && !setup.time_sync_disabled {
            info!(
                "stream starts differ by {}; forcing disconnected clocks",
                start_gap
            );
        }

        let main_start = match setup.main {
            MediaKind::Audio => setup.audio_start,
            MediaKind::Video | MediaKind::Subtitle => setup.video_start,
        };

        if disconnected {
            let reference_kind = if setup.is_live_stream {
                MediaKind::Audio
            } else {
                setup.main
            };
            *state = TimingState {
                audio_clock: Arc::new(RealTimeClock::new()),
                video_clock: Arc::new(RealTimeClock::new()),
                audio_offset: setup.audio_start,
                video_offset: setup.video_start,
                subtitle_offset: setup.video_start,
                reference_offset: match reference_kind {
                    MediaKind::Audio => setup.audio_start,
                    MediaKind::Video | MediaKind::Subtitle => setup.video_start,
                },
                reference_kind,
                has_disconnected: true,
                initialized: true,
            };
        } else {
            let mut connected = TimingState::connected();
            connected.audio_offset = main_start;
            connected.video_offset = main_start;
            connected.subtitle_offset = main_start;
            connected.reference_offset = main_start;
            connected.reference_kind = setup.main;
            connected.initialized = true;
            *state = connected;
        }

        state.each_clock(|clock| clock.set_speed_ratio(prior_speed));
        if had_prior {
            let restored = prior_position - state.reference_offset;
            state.each_clock(|clock| clock.update(restored));
            if was_running {
                state.each_clock(RealTimeClock::play);
            }
        }

        state.has_disconnected
    }

    /// Position of `kind`, or of the reference component for `None`.
    pub fn position(&self, kind: Option<MediaKind>) -> MediaTime {
        let state = self.state.read();
        state.clock(kind).position() + state.offset(kind)
    }

    /// Move `kind`'s clock so it reports `position`. `None` moves every
    /// clock.
    pub fn update(&self, position: MediaTime, kind: Option<MediaKind>) {
        let state = self.state.write();
        match kind {
            Some(kind) => {
                let offset = state.offset(Some(kind));
                state.clock(Some(kind)).update(position - offset);
            }
            None => {
                state
                    .audio_clock
                    .update(position - state.offset(Some(MediaKind::Audio)));
                if !Arc::ptr_eq(&state.audio_clock, &state.video_clock) {
                    state
                        .video_clock
                        .update(position - state.offset(Some(MediaKind::Video)));
                }
            }
        }
    }

    /// Start `kind`'s clock, or every clock for `None`.
    pub fn play(&self, kind: Option<MediaKind>) {
        let state = self.state.write();
        match kind {
            Some(kind) => state.clock(Some(kind)).play(),
            None => state.each_clock(RealTimeClock::play),
        }
    }

    /// Pause `kind`'s clock, or every clock for `None`.
    pub fn pause(&self, kind: Option<MediaKind>) {
        let state = self.state.write();
        match kind {
            Some(kind) => state.clock(Some(kind)).pause(),
            None => state.each_clock(RealTimeClock::pause),
        }
    }

    /// Reset `kind`'s clock to zero, or every clock for `None`.
    pub fn reset(&self, kind: Option<MediaKind>) {
        let state = self.state.write();
        match kind {
            Some(kind) => state.clock(Some(kind)).reset(),
            None => state.each_clock(RealTimeClock::reset),
        }
    }

    pub fn speed_ratio(&self) -> f64 {
        self.state.read().clock(None).speed_ratio()
    }

    /// Apply a speed ratio to the audio and video clocks (subtitles follow
    /// video).
    pub fn set_speed_ratio(&self, ratio: f64) {
        let state = self.state.write();
        state.each_clock(|clock| clock.set_speed_ratio(ratio));
    }

    pub fn has_disconnected_clocks(&self) -> bool {
        self.state.read().has_disconnected
    }

    /// Whether the reference clock is advancing.
    pub fn is_running(&self) -> bool {
        self.state.read().clock(None).is_running()
    }
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn connected_setup() -> TimingSetup {
        TimingSetup {
            main: MediaKind::Video,
            has_audio: true,
            has_video: true,
            audio_start: MediaTime::from_millis(10),
            video_start: MediaTime::from_millis(10),
            is_live_stream: false,
            time_sync_disabled: false,
        }
    }

    #[test]
    fn connected_mode_shares_one_clock() {
        let timing = TimingController::new();
        assert!(!timing.setup(connected_setup()));
        assert!(!timing.has_disconnected_clocks());

        timing.update(MediaTime::from_secs(3), None);
        assert_eq!(
            timing.position(Some(MediaKind::Audio)),
            timing.position(Some(MediaKind::Video))
        );
        assert_eq!(
            timing.position(Some(MediaKind::Subtitle)),
            timing.position(None)
        );
    }

    #[test]
    fn wide_start_gap_forces_disconnected_clocks() {
        let timing = TimingController::new();
        let disconnected = timing.setup(TimingSetup {
            audio_start: MediaTime::ZERO,
            video_start: MediaTime::from_secs(30),
            ..connected_setup()
        });
        assert!(disconnected);
        assert!(timing.has_disconnected_clocks());
    }

    #[test]
    fn disconnected_clocks_advance_independently() {
        let timing = TimingController::new();
        timing.setup(TimingSetup {
            time_sync_disabled: true,
            ..connected_setup()
        });

        timing.play(None);
        timing.pause(Some(MediaKind::Audio));
        let audio_frozen = timing.position(Some(MediaKind::Audio));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(timing.position(Some(MediaKind::Audio)), audio_frozen);
        assert!(timing.position(Some(MediaKind::Video)) > MediaTime::from_millis(10));
    }

    #[test]
    fn positions_include_stream_offsets() {
        let timing = TimingController::new();
        timing.setup(TimingSetup {
            time_sync_disabled: true,
            audio_start: MediaTime::from_secs(1),
            video_start: MediaTime::from_secs(2),
            ..connected_setup()
        });
        // Freshly set-up clocks report each stream's own start.
        assert_eq!(timing.position(Some(MediaKind::Audio)), MediaTime::from_secs(1));
        assert_eq!(timing.position(Some(MediaKind::Video)), MediaTime::from_secs(2));
        assert_eq!(
            timing.position(Some(MediaKind::Subtitle)),
            MediaTime::from_secs(2)
        );

        timing.update(MediaTime::from_secs(5), Some(MediaKind::Audio));
        assert_eq!(timing.position(Some(MediaKind::Audio)), MediaTime::from_secs(5));
        assert_eq!(timing.position(Some(MediaKind::Video)), MediaTime::from_secs(2));
    }

    #[test]
    fn live_streams_reference_the_audio_clock() {
        let timing = TimingController::new();
        timing.setup(TimingSetup {
            time_sync_disabled: true,
            is_live_stream: true,
            ..connected_setup()
        });
        timing.update(MediaTime::from_secs(7), Some(MediaKind::Audio));
        assert_eq!(timing.position(None), MediaTime::from_secs(7));
    }

    #[test]
    fn resetup_preserves_speed_and_position() {
        let timing = TimingController::new();
        timing.setup(connected_setup());
        timing.set_speed_ratio(2.0);
        timing.update(MediaTime::from_secs(9), None);

        timing.setup(connected_setup());
        assert_eq!(timing.speed_ratio(), 2.0);
        assert_eq!(timing.position(None), MediaTime::from_secs(9));
        assert!(!timing.is_running());
    }
}
