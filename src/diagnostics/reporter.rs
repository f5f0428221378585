//! Periodic playback status reporter for UI updates.

use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::status::PlaybackStatus;
use crate::error::PlaybackError;
use crate::playback::context::PlaybackContext;
use crate::playback::worker::{
    StateChangeHandle, TimerWorker, Worker, WorkerAgent, WorkerState,
};
use crate::tools::events::CancellationToken;

/// Cycle body: capture a snapshot and forward it when it changed.
struct StatusAgent {
    context: Arc<PlaybackContext>,
    report: Box<dyn FnMut(PlaybackStatus) + Send>,
    last_report: Option<PlaybackStatus>,
}

impl WorkerAgent for StatusAgent {
    fn execute_cycle(&mut self, _token: &CancellationToken) -> Result<(), PlaybackError> {
        let status = PlaybackStatus::capture(&self.context);
        if self.last_report.as_ref() != Some(&status) {
            (self.report)(status.clone());
            self.last_report = Some(status);
        }
        Ok(())
    }
}

/// Polls a [`PlaybackContext`] at a fixed interval and invokes the callback
/// whenever the observable status changes.
///
/// Reporting is just another low-rate worker, so it runs on the shared
/// timer substrate and follows the same lifecycle as the pipeline workers:
/// `start`, `pause`/`resume`, and a terminal `stop`.
pub struct StatusReporter {
    worker: TimerWorker<StatusAgent>,
}

impl StatusReporter {
    pub fn new(
        context: Arc<PlaybackContext>,
        report: impl FnMut(PlaybackStatus) + Send + 'static,
        interval: Duration,
    ) -> Self {
        Self {
            worker: TimerWorker::new(
                "status-reporter",
                Some(interval),
                StatusAgent {
                    context,
                    report: Box::new(report),
                    last_report: None,
                },
            ),
        }
    }

    /// Begin reporting. The first snapshot is always delivered.
    pub fn start(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.worker.start()
    }

    /// Suspend reporting without tearing the worker down.
    pub fn pause(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.worker.pause()
    }

    pub fn resume(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.worker.resume()
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Stop reporting for good. Create a new reporter to start over.
    pub fn stop(&self) {
        self.worker.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::MediaKind;
    use crate::test_support::fixture::Fixture;
    use crate::time::MediaTime;
    use parking_lot::Mutex;

    #[test]
    fn reports_only_on_change() {
        let fixture = Fixture::audio_video();
        let reports: Arc<Mutex<Vec<PlaybackStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let reporter = StatusReporter::new(
            fixture.context.clone(),
            move |status| sink.lock().push(status),
            Duration::from_millis(5),
        );

        assert_eq!(reporter.start().unwrap().wait(), WorkerState::Waiting);
        std::thread::sleep(Duration::from_millis(30));
        let stable_count = reports.lock().len();
        // Nothing changed after the initial snapshot.
        assert_eq!(stable_count, 1);

        fixture.fill_blocks(MediaKind::Video, 0, 40, 2);
        fixture.timing.update(MediaTime::from_millis(40), None);
        std::thread::sleep(Duration::from_millis(30));
        reporter.stop();
        assert_eq!(reporter.state(), WorkerState::Stopped);

        assert!(reports.lock().len() > stable_count);
    }

    #[test]
    fn paused_reporter_stays_quiet() {
        let fixture = Fixture::audio_video();
        let reports: Arc<Mutex<Vec<PlaybackStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let reporter = StatusReporter::new(
            fixture.context.clone(),
            move |status| sink.lock().push(status),
            Duration::from_millis(5),
        );

        reporter.start().unwrap().wait();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(reporter.pause().unwrap().wait(), WorkerState::Paused);

        let at_pause = reports.lock().len();
        fixture.timing.update(MediaTime::from_millis(90), None);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(reports.lock().len(), at_pause);

        reporter.resume().unwrap().wait();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while reports.lock().len() == at_pause && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(reports.lock().len() > at_pause);
        reporter.stop();
    }
}
