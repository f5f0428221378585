//! Timer-driven worker substrate.
//!
//! Cycles run as one-shot deadlines on a single shared scheduler thread and
//! are rearmed at the end of each cycle, so dispatch never overlaps for a
//! given worker. Suits low-rate workers that do not warrant a dedicated
//! thread.

use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::PlaybackError;
use crate::playback::worker::{
    run_single_cycle, CycleOutcome, StateChangeHandle, Worker, WorkerAgent, WorkerCore,
    WorkerRequest, WorkerState,
};
use crate::tools::events::WaitEvent;

trait TimerJob: Send + Sync {
    /// Run one cycle; return the deadline for the next one, or `None` when
    /// the job must not be rearmed.
    fn run_cycle(&self) -> Option<Instant>;
}

struct SchedulerEntry {
    due: Instant,
    job: Weak<dyn TimerJob>,
}

#[derive(Default)]
struct SchedulerState {
    entries: Vec<SchedulerEntry>,
}

/// The process-wide deadline scheduler shared by all timer workers.
struct TimerScheduler {
    state: Mutex<SchedulerState>,
    signal: Condvar,
}

impl TimerScheduler {
    fn global() -> &'static TimerScheduler {
        static SCHEDULER: OnceLock<TimerScheduler> = OnceLock::new();
        SCHEDULER.get_or_init(|| {
            let scheduler = TimerScheduler {
                state: Mutex::new(SchedulerState::default()),
                signal: Condvar::new(),
            };
            let spawned = std::thread::Builder::new()
                .name("timer-worker-scheduler".to_string())
                .spawn(|| TimerScheduler::global().run());
            if let Err(error) = spawned {
                log::warn!("failed to spawn timer scheduler: {}", error);
            }
            scheduler
        })
    }

    fn schedule(&self, due: Instant, job: Weak<dyn TimerJob>) {
        let mut state = self.state.lock();
        let existing = state.entries.iter_mut().find(|entry| {
            match (entry.job.upgrade(), job.upgrade()) {
                (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
                _ => false,
            }
        });
        match existing {
            Some(entry) => entry.due = entry.due.min(due),
            None => state.entries.push(SchedulerEntry { due, job }),
        }
        self.signal.notify_one();
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            state.entries.retain(|entry| entry.job.strong_count() > 0);

            if let Some(position) = state.entries.iter().position(|entry| entry.due <= now) {
                let entry = state.entries.swap_remove(position);
                drop(state);
                if let Some(job) = entry.job.upgrade() {
                    if let Some(next_due) = job.run_cycle() {
                        self.schedule(next_due, entry.job);
                    }
                }
                state = self.state.lock();
                continue;
            }

            match state.entries.iter().map(|entry| entry.due).min() {
                Some(due) => {
                    self.signal.wait_until(&mut state, due);
                }
                None => self.signal.wait(&mut state),
            }
        }
    }
}

struct TimerShared<A: WorkerAgent> {
    core: WorkerCore,
    agent: Mutex<A>,
    finished: WaitEvent,
}

impl<A: WorkerAgent> TimerJob for TimerShared<A> {
    fn run_cycle(&self) -> Option<Instant> {
        // The scheduler thread is the only dispatcher, so cycles for this
        // job never overlap.
        let mut agent = self.agent.lock();
        match run_single_cycle(&self.core, &mut *agent) {
            CycleOutcome::Exit => {
                self.finished.complete();
                None
            }
            CycleOutcome::Immediate => Some(Instant::now()),
            CycleOutcome::Delay(Some(delay)) => Some(Instant::now() + delay),
            // Indefinite park: the next request schedules an immediate run.
            CycleOutcome::Delay(None) => None,
        }
    }
}

/// A worker whose cycles are dispatched by the shared timer scheduler.
pub struct TimerWorker<A: WorkerAgent> {
    shared: Arc<TimerShared<A>>,
}

impl<A: WorkerAgent> TimerWorker<A> {
    pub fn new(name: impl Into<String>, period: Option<Duration>, agent: A) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                core: WorkerCore::new(name, period),
                agent: Mutex::new(agent),
                finished: WaitEvent::begun(),
            }),
        }
    }

    fn request(&self, request: WorkerRequest) -> Result<StateChangeHandle, PlaybackError> {
        let (handle, _) = self.shared.core.submit(request)?;
        if !handle.is_resolved() {
            // Arm an immediate dispatch so the pending request commits even
            // while the job is parked without a deadline.
            self.schedule_cycle(Duration::ZERO);
        }
        Ok(handle)
    }

    /// Arm the one-shot timer for the next cycle.
    fn schedule_cycle(&self, delay: Duration) {
        let job: Arc<dyn TimerJob> = self.shared.clone();
        TimerScheduler::global().schedule(Instant::now() + delay, Arc::downgrade(&job));
    }
}

impl<A: WorkerAgent> Worker for TimerWorker<A> {
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
        let stopped_without_loop = self.shared.core.state() == WorkerState::Created;
        if let Ok(handle) = self.request(WorkerRequest::Stop) {
            handle.wait();
        }
        self.shared.core.mark_disposed();
        if !stopped_without_loop {
            self.shared.finished.wait_timeout(Duration::from_secs(5));
        }
        self.shared.core.dispose_events();
    }
}

impl<A: WorkerAgent> Drop for TimerWorker<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}
