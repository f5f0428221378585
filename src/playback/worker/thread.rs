//! Dedicated-thread worker substrate.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;

use crate::error::PlaybackError;
use crate::playback::worker::{
    run_single_cycle, CycleOutcome, StateChangeHandle, Worker, WorkerAgent, WorkerCore,
    WorkerRequest, WorkerState,
};

struct ThreadShared<A: WorkerAgent> {
    core: WorkerCore,
    agent: Mutex<Option<A>>,
}

/// A worker whose cycle loop runs on its own named thread.
///
/// The thread is spawned by the first `start` (or `resume`) request and
/// joined on dispose. Cycle jitter stays isolated from the rest of the
/// process, which the block-rendering worker depends on.
pub struct ThreadWorker<A: WorkerAgent> {
    shared: Arc<ThreadShared<A>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<A: WorkerAgent> ThreadWorker<A> {
    /// Create a worker in the `Created` state. `period` of `None` means the
    /// worker sleeps until its agent's wake signal or the next request.
    pub fn new(name: impl Into<String>, period: Option<Duration>, agent: A) -> Self {
        Self {
            shared: Arc::new(ThreadShared {
                core: WorkerCore::new(name, period),
                agent: Mutex::new(Some(agent)),
            }),
            join_handle: Mutex::new(None),
        }
    }

    fn request(&self, request: WorkerRequest) -> Result<StateChangeHandle, PlaybackError> {
        let (handle, needs_loop) = self.shared.core.submit(request)?;
        if needs_loop {
            self.spawn_loop();
        }
        Ok(handle)
    }

    fn spawn_loop(&self) {
        let mut join_handle = self.join_handle.lock();
        if join_handle.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name(shared.core.name().to_string())
            .spawn(move || {
                let mut agent = match shared.agent.lock().take() {
                    Some(agent) => agent,
                    None => return,
                };
                loop {
                    match run_single_cycle(&shared.core, &mut agent) {
                        CycleOutcome::Exit => break,
                        CycleOutcome::Immediate => continue,
                        CycleOutcome::Delay(delay) => {
                            let token = shared.core.token();
                            if !shared.core.has_pending() {
                                agent.cycle_delay(delay, &token);
                            }
                        }
                    }
                }
            });
        match spawned {
            Ok(handle) => *join_handle = Some(handle),
            Err(error) => warn!(
                "worker {}: failed to spawn thread: {}",
                self.shared.core.name(),
                error
            ),
        }
    }
}

impl<A: WorkerAgent> Worker for ThreadWorker<A> {
    fn name(&self) -> &str {
        self.shared.core.name()
    }

    fn state(&self) -> WorkerState {
        self.shared.core.state()
    }

    fn start(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.request(WorkerRequest::Start)
    }

    fn pause(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.request(WorkerRequest::Pause)
    }

    fn resume(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.request(WorkerRequest::Resume)
    }

    fn stop(&self) -> Result<StateChangeHandle, PlaybackError> {
        self.request(WorkerRequest::Stop)
    }

    fn wait_for_cycle(&self, timeout: Duration) -> bool {
        self.shared.core.wait_for_cycle(timeout)
    }

    fn wait_for_state_change(&self, timeout: Duration) -> bool {
        self.shared.core.wait_for_state_change(timeout)
    }

    fn dispose(&self) {
        if self.shared.core.is_disposed() {
            return;
        }
        if let Ok(handle) = self.request(WorkerRequest::Stop) {
            handle.wait();
        }
        self.shared.core.mark_disposed();
        if let Some(join_handle) = self.join_handle.lock().take() {
            if join_handle.thread().id() == std::thread::current().id() {
                warn!(
                    "worker {}: dispose called from its own thread; skipping join",
                    self.shared.core.name()
                );
            } else if join_handle.join().is_err() {
                warn!(
                    "worker {}: thread panicked during join",
                    self.shared.core.name()
                );
            }
        }
        self.shared.core.dispose_events();
    }
}

impl<A: WorkerAgent> Drop for ThreadWorker<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}
