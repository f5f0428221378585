//! A pauseable wall-clock-anchored playback clock.

use std::time::Instant;

use parking_lot::Mutex;

use crate::constants::DEFAULT_SPEED_RATIO;
use crate::time::MediaTime;

#[derive(Debug)]
struct ClockState {
    /// Position accumulated up to the last anchor change.
    offset: MediaTime,
    /// Wall-clock anchor while running, `None` while frozen.
    anchor: Option<Instant>,
    speed_ratio: f64,
}

impl ClockState {
    fn position(&self) -> MediaTime {
        match self.anchor {
            Some(anchor) => {
                self.offset
                    + MediaTime::from_duration(anchor.elapsed()).scaled_by(self.speed_ratio)
            }
            None => self.offset,
        }
    }

    /// Fold the running segment into the offset so the anchor can change
    /// without the reported position jumping.
    fn freeze_position(&mut self) {
        self.offset = self.position();
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

/// A real-time clock whose position advances with wall time while running
/// and stays frozen otherwise.
#[derive(Debug)]
pub struct RealTimeClock {
    state: Mutex<ClockState>,
}

impl RealTimeClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                offset: MediaTime::ZERO,
                anchor: None,
                speed_ratio: DEFAULT_SPEED_RATIO,
            }),
        }
    }

    /// Current position: `offset + elapsed × speed_ratio` while running.
    pub fn position(&self) -> MediaTime {
        self.state.lock().position()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().anchor.is_some()
    }

    /// Start advancing. No-op while already running.
    pub fn play(&self) {
        let mut state = self.state.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
    }

    /// Freeze the position. No-op while already paused.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.anchor.is_some() {
            state.offset = state.position();
            state.anchor = None;
        }
    }

    /// Stop and move the position back to zero. The speed ratio survives.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.offset = MediaTime::ZERO;
        state.anchor = None;
    }

    /// Jump the position, preserving the running state.
    pub fn update(&self, position: MediaTime) {
        let mut state = self.state.lock();
        state.offset = position;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }

    pub fn speed_ratio(&self) -> f64 {
        self.state.lock().speed_ratio
    }

    /// Change the speed ratio without a position discontinuity.
    pub fn set_speed_ratio(&self, ratio: f64) {
        let mut state = self.state.lock();
        state.freeze_position();
        state.speed_ratio = ratio.max(0.0);
    }
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn advances_only_while_running() {
        let clock = RealTimeClock::new();
        assert_eq!(clock.position(), MediaTime::ZERO);
        assert!(!clock.is_running());

        clock.play();
        thread::sleep(Duration::from_millis(30));
        clock.pause();
        let frozen = clock.position();
        assert!(frozen > MediaTime::ZERO);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.position(), frozen);
    }

    #[test]
    fn position_is_monotonic_while_running() {
        let clock = RealTimeClock::new();
        clock.play();
        let mut last = clock.position();
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(2));
            let now = clock.position();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn update_jumps_without_stopping() {
        let clock = RealTimeClock::new();
        clock.play();
        clock.update(MediaTime::from_secs(5));
        assert!(clock.is_running());
        assert!(clock.position() >= MediaTime::from_secs(5));

        clock.pause();
        clock.update(MediaTime::from_secs(1));
        assert_eq!(clock.position(), MediaTime::from_secs(1));
        assert!(!clock.is_running());
    }

    #[test]
    fn reset_zeroes_and_stops_but_keeps_speed() {
        let clock = RealTimeClock::new();
        clock.set_speed_ratio(2.0);
        clock.play();
        clock.reset();
        assert_eq!(clock.position(), MediaTime::ZERO);
        assert!(!clock.is_running());
        assert_eq!(clock.speed_ratio(), 2.0);
    }

    #[test]
    fn speed_change_has_no_discontinuity() {
        let clock = RealTimeClock::new();
        clock.update(MediaTime::from_secs(10));
        clock.set_speed_ratio(4.0);
        let position = clock.position();
        assert_eq!(position, MediaTime::from_secs(10));
    }
}
