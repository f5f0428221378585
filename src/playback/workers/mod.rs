//! The three pipeline workers and their bulk orchestrator.

pub mod decoding;
pub mod reading;
pub mod rendering;

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::constants::{HIGH_PRIORITY_PERIOD, THREAD_WORKER_PERIOD};
use crate::error::PlaybackError;
use crate::playback::context::PlaybackContext;
use crate::playback::worker::{StateChangeHandle, ThreadWorker, Worker, WorkerState};

pub use decoding::FrameDecodingAgent;
pub use reading::PacketReadingAgent;
pub use rendering::BlockRenderingAgent;

/// Owns the packet-reading, frame-decoding, and block-rendering workers and
/// applies transport operations to them as a set.
///
/// All three run on dedicated threads; the rendering worker in particular
/// must never share a scheduling substrate, to keep delivery jitter low.
pub struct MediaWorkerSet {
    reading: ThreadWorker<PacketReadingAgent>,
    decoding: ThreadWorker<FrameDecodingAgent>,
    rendering: ThreadWorker<BlockRenderingAgent>,
}

impl MediaWorkerSet {
    pub fn new(context: Arc<PlaybackContext>) -> Self {
        Self {
            reading: ThreadWorker::new(
                "packet-reading",
                None,
                PacketReadingAgent::new(context.clone()),
            ),
            decoding: ThreadWorker::new(
                "frame-decoding",
                Some(THREAD_WORKER_PERIOD),
                FrameDecodingAgent::new(context.clone()),
            ),
            rendering: ThreadWorker::new(
                "block-rendering",
                Some(HIGH_PRIORITY_PERIOD),
                BlockRenderingAgent::new(context),
            ),
        }
    }

    fn all(&self) -> [&dyn Worker; 3] {
        [&self.reading, &self.decoding, &self.rendering]
    }

    /// Spawn all three workers and wait until each reports `Waiting`.
    pub fn start(&self) -> Result<(), PlaybackError> {
        let handles = self.dispatch(|worker| worker.start())?;
        Self::await_all(handles);
        info!("media workers started");
        Ok(())
    }

    /// Pause every worker.
    pub fn pause_all(&self) -> Result<(), PlaybackError> {
        let handles = self.dispatch(|worker| worker.pause())?;
        Self::await_all(handles);
        Ok(())
    }

    /// Resume every worker.
    pub fn resume_all(&self) -> Result<(), PlaybackError> {
        let handles = self.dispatch(|worker| worker.resume())?;
        Self::await_all(handles);
        Ok(())
    }

    /// Pause only the ingest half of the pipeline, leaving rendering alive
    /// (used while changing media position).
    pub fn pause_read_decode(&self) -> Result<(), PlaybackError> {
        let handles = vec![self.reading.pause()?, self.decoding.pause()?];
        Self::await_all(handles);
        Ok(())
    }

    /// Resume exactly the workers that are currently paused.
    pub fn resume_paused(&self) -> Result<(), PlaybackError> {
        let mut handles = Vec::new();
        for worker in self.all() {
            if worker.state() == WorkerState::Paused {
                handles.push(worker.resume()?);
            }
        }
        Self::await_all(handles);
        Ok(())
    }

    pub fn reading_state(&self) -> WorkerState {
        self.reading.state()
    }

    pub fn decoding_state(&self) -> WorkerState {
        self.decoding.state()
    }

    pub fn rendering_state(&self) -> WorkerState {
        self.rendering.state()
    }

    /// Block until the rendering worker finishes its current cycle.
    pub fn wait_for_rendering_cycle(&self, timeout: Duration) -> bool {
        self.rendering.wait_for_cycle(timeout)
    }

    /// Pause, stop, and join all workers. Idempotent.
    pub fn dispose(&self) {
        // Requests on disposed workers just resolve, so a best-effort pause
        // first keeps teardown orderly.
        let _ = self.pause_all();
        for worker in self.all() {
            worker.dispose();
        }
        info!("media workers disposed");
    }

    fn dispatch(
        &self,
        request: impl Fn(&dyn Worker) -> Result<StateChangeHandle, PlaybackError>,
    ) -> Result<Vec<StateChangeHandle>, PlaybackError> {
        // Dispatch everything first so the workers transition concurrently,
        // then await the handles.
        self.all().into_iter().map(|worker| request(worker)).collect()
    }

    fn await_all(handles: Vec<StateChangeHandle>) {
        for handle in handles {
            handle.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture::Fixture;

    #[test]
    fn start_brings_all_workers_out_of_created() {
        let fixture = Fixture::audio_video();
        let workers = MediaWorkerSet::new(fixture.context.clone());
        workers.start().unwrap();
        assert_ne!(workers.reading_state(), WorkerState::Created);
        assert_ne!(workers.decoding_state(), WorkerState::Created);
        assert_ne!(workers.rendering_state(), WorkerState::Created);
        workers.dispose();
        assert_eq!(workers.rendering_state(), WorkerState::Stopped);
    }

    #[test]
    fn pause_read_decode_leaves_rendering_active() {
        let fixture = Fixture::audio_video();
        let workers = MediaWorkerSet::new(fixture.context.clone());
        workers.start().unwrap();
        workers.pause_read_decode().unwrap();
        assert_eq!(workers.reading_state(), WorkerState::Paused);
        assert_eq!(workers.decoding_state(), WorkerState::Paused);
        assert_ne!(workers.rendering_state(), WorkerState::Paused);

        workers.resume_paused().unwrap();
        assert_ne!(workers.reading_state(), WorkerState::Paused);
        assert_ne!(workers.decoding_state(), WorkerState::Paused);
        workers.dispose();
    }

    #[test]
    fn dispose_is_idempotent() {
        let fixture = Fixture::audio_video();
        let workers = MediaWorkerSet::new(fixture.context.clone());
        workers.start().unwrap();
        workers.dispose();
        workers.dispose();
        assert_eq!(workers.reading_state(), WorkerState::Stopped);
    }
}
