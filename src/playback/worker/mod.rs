//! Cooperative worker state machine shared by both scheduling substrates.
//!
//! A worker advances through `Created → Waiting ⇄ Running/Paused → Stopped`.
//! State-change requests go through a one-slot pending queue, cancel the
//! current cycle token, and resolve an awaitable handle with the
//! post-transition state. Cycles never block a transition for longer than
//! their cooperative cancellation checks allow.

pub mod thread;
pub mod timer;

use std::time::{Duration, Instant};

use log::{debug, error};
use parking_lot::Mutex;

use crate::error::PlaybackError;
use crate::tools::atomics::{AtomicCounter, AtomicFlag};
use crate::tools::events::{CancellationToken, CancellationTokenOwner, WaitEvent};

pub use thread::ThreadWorker;
pub use timer::TimerWorker;

/// Lifecycle states of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Waiting,
    Running,
    Paused,
    Stopped,
}

impl WorkerState {
    fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Created,
            1 => Self::Waiting,
            2 => Self::Running,
            3 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    fn code(self) -> i64 {
        match self {
            Self::Created => 0,
            Self::Waiting => 1,
            Self::Running => 2,
            Self::Paused => 3,
            Self::Stopped => 4,
        }
    }
}

/// State-change requests accepted by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequest {
    Start,
    Pause,
    Resume,
    Stop,
}

/// The worker transition table. `None` means the request is a no-op in the
/// given state.
fn transition(from: WorkerState, request: WorkerRequest) -> Option<WorkerState> {
    use WorkerRequest::*;
    use WorkerState::*;
    match (from, request) {
        (Created, Start) | (Created, Resume) => Some(Waiting),
        (Created, Stop) => Some(Stopped),
        (Waiting, Pause) | (Running, Pause) => Some(Paused),
        (Waiting, Resume) | (Running, Resume) | (Paused, Resume) => Some(Waiting),
        (Waiting, Stop) | (Running, Stop) | (Paused, Stop) | (Stopped, Stop) => Some(Stopped),
        _ => None,
    }
}

/// Awaitable completion handle for a state-change request.
///
/// Clones share the same resolution; a request submitted while another is
/// pending returns a clone of the pending handle.
#[derive(Debug, Clone)]
pub struct StateChangeHandle {
    inner: std::sync::Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    event: WaitEvent,
    result: Mutex<Option<WorkerState>>,
}

impl StateChangeHandle {
    fn pending() -> Self {
        Self {
            inner: std::sync::Arc::new(HandleInner {
                event: WaitEvent::begun(),
                result: Mutex::new(None),
            }),
        }
    }

    fn resolved(state: WorkerState) -> Self {
        let handle = Self::pending();
        handle.resolve(state);
        handle
    }

    fn resolve(&self, state: WorkerState) {
        *self.inner.result.lock() = Some(state);
        self.inner.event.complete();
    }

    /// Block until the request commits and return the post-transition state.
    pub fn wait(&self) -> WorkerState {
        self.inner.event.wait();
        self.inner.result.lock().unwrap_or(WorkerState::Stopped)
    }

    /// Like [`StateChangeHandle::wait`] with a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WorkerState> {
        if self.inner.event.wait_timeout(timeout) {
            *self.inner.result.lock()
        } else {
            None
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.result.lock().is_some()
    }
}

/// Per-cycle user logic plugged into a worker substrate.
pub trait WorkerAgent: Send + 'static {
    /// One cycle of work. Long-running bodies must poll `token`.
    fn execute_cycle(&mut self, token: &CancellationToken) -> Result<(), PlaybackError>;

    /// Called with any error the cycle returned; the loop continues.
    fn on_cycle_error(&mut self, error: &PlaybackError) {
        error!("worker cycle failed: {}", error);
    }

    /// Delay between cycles. `None` means wait indefinitely (until the next
    /// request cancels `token`). Agents override this to sleep on their own
    /// wake signals.
    fn cycle_delay(&mut self, delay: Option<Duration>, token: &CancellationToken) {
        match delay {
            Some(delay) if delay.is_zero() => {}
            Some(delay) => {
                token.wait_timeout(delay);
            }
            None => token.wait(),
        }
    }
}

/// What the loop should do after one cycle.
pub(crate) enum CycleOutcome {
    /// Run the next cycle without delay (a request was just committed).
    Immediate,
    /// Delay before the next cycle; `None` is an indefinite park.
    Delay(Option<Duration>),
    /// The worker reached `Stopped`; leave the loop.
    Exit,
}

struct PendingRequest {
    request: WorkerRequest,
    handle: StateChangeHandle,
}

/// Substrate-independent worker internals.
pub(crate) struct WorkerCore {
    name: String,
    period: Option<Duration>,
    state: AtomicCounter,
    pending: Mutex<Option<PendingRequest>>,
    cancellation: CancellationTokenOwner,
    state_changed: WaitEvent,
    cycle_completed: WaitEvent,
    disposed: AtomicFlag,
}

impl WorkerCore {
    pub(crate) fn new(name: impl Into<String>, period: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            period,
            state: AtomicCounter::new(WorkerState::Created.code()),
            pending: Mutex::new(None),
            cancellation: CancellationTokenOwner::new(),
            state_changed: WaitEvent::new(),
            cycle_completed: WaitEvent::new(),
            disposed: AtomicFlag::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_code(self.state.value())
    }

    fn set_state(&self, state: WorkerState) {
        self.state.set(state.code());
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancellation.token()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.value()
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.set(true);
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn take_pending(&self) -> Option<PendingRequest> {
        self.pending.lock().take()
    }

    /// Queue a state-change request.
    ///
    /// Returns the pending handle (shared when a request is already queued)
    /// or a pre-resolved handle for requests the loop need not see. The
    /// second tuple element tells the substrate whether its loop must be
    /// started for the request to commit.
    pub(crate) fn submit(
        &self,
        request: WorkerRequest,
    ) -> Result<(StateChangeHandle, bool), PlaybackError> {
        if self.is_disposed() {
            return Err(PlaybackError::Disposed("worker"));
        }
        let mut pending = self.pending.lock();
        if let Some(queued) = &*pending {
            return Ok((queued.handle.clone(), false));
        }

        let state = self.state();
        match (state, request) {
            (WorkerState::Stopped, _) => {
                return Ok((StateChangeHandle::resolved(WorkerState::Stopped), false))
            }
            (WorkerState::Created, WorkerRequest::Pause) => {
                return Err(PlaybackError::InvalidState {
                    operation: "pause",
                    state: format!("{:?}", state),
                })
            }
            (WorkerState::Created, WorkerRequest::Stop) => {
                // Never started, nothing to unwind.
                self.set_state(WorkerState::Stopped);
                self.state_changed.complete();
                return Ok((StateChangeHandle::resolved(WorkerState::Stopped), false));
            }
            _ => {}
        }

        let needs_loop = state == WorkerState::Created;
        let handle = StateChangeHandle::pending();
        *pending = Some(PendingRequest {
            request,
            handle: handle.clone(),
        });
        drop(pending);

        // Wake the loop: the delay waits on the soon-to-be-cancelled token.
        self.cancellation.cancel();
        Ok((handle, needs_loop))
    }

    pub(crate) fn wait_for_cycle(&self, timeout: Duration) -> bool {
        self.cycle_completed.wait_timeout(timeout)
    }

    pub(crate) fn wait_for_state_change(&self, timeout: Duration) -> bool {
        self.state_changed.wait_timeout(timeout)
    }

    pub(crate) fn dispose_events(&self) {
        self.state_changed.dispose();
        self.cycle_completed.dispose();
    }
}

/// Run one iteration of the worker loop: commit a pending request or execute
/// the agent cycle, then report how to continue.
pub(crate) fn run_single_cycle(core: &WorkerCore, agent: &mut dyn WorkerAgent) -> CycleOutcome {
    let cycle_started = Instant::now();
    let initial = core.state();
    if initial == WorkerState::Stopped {
        return CycleOutcome::Exit;
    }
    core.cycle_completed.begin();

    if let Some(pending) = core.take_pending() {
        let target = transition(initial, pending.request).unwrap_or(initial);
        core.state_changed.begin();
        core.set_state(target);
        pending.handle.resolve(target);
        core.state_changed.complete();
        debug!(
            "worker {}: {:?} request committed {:?} -> {:?}",
            core.name(),
            pending.request,
            initial,
            target
        );
        core.cycle_completed.complete();
        return if target == WorkerState::Stopped {
            CycleOutcome::Exit
        } else {
            CycleOutcome::Immediate
        };
    }

    if initial == WorkerState::Waiting {
        let token = core.token();
        if !token.is_cancelled() {
            core.set_state(WorkerState::Running);
            if let Err(error) = agent.execute_cycle(&token) {
                agent.on_cycle_error(&error);
            }
        }
    }

    let resting = if initial == WorkerState::Paused {
        WorkerState::Paused
    } else {
        WorkerState::Waiting
    };
    core.set_state(resting);
    core.cycle_completed.complete();

    if core.is_disposed() {
        return CycleOutcome::Exit;
    }
    let delay = if initial == WorkerState::Paused {
        None
    } else {
        core.period
            .map(|period| period.saturating_sub(cycle_started.elapsed()))
    };
    CycleOutcome::Delay(delay)
}

/// The operations common to both worker substrates.
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> WorkerState;

    fn start(&self) -> Result<StateChangeHandle, PlaybackError>;

    fn pause(&self) -> Result<StateChangeHandle, PlaybackError>;

    fn resume(&self) -> Result<StateChangeHandle, PlaybackError>;

    fn stop(&self) -> Result<StateChangeHandle, PlaybackError>;

    /// Block until the in-flight cycle completes, up to `timeout`.
    fn wait_for_cycle(&self, timeout: Duration) -> bool;

    /// Block until the next state change commits, up to `timeout`.
    fn wait_for_state_change(&self, timeout: Duration) -> bool;

    /// Stop the worker, release its scheduling substrate, and complete all
    /// events. Idempotent.
    fn dispose(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_contract() {
        use WorkerRequest::*;
        use WorkerState::*;
        assert_eq!(transition(Created, Start), Some(Waiting));
        assert_eq!(transition(Created, Resume), Some(Waiting));
        assert_eq!(transition(Created, Stop), Some(Stopped));
        assert_eq!(transition(Waiting, Pause), Some(Paused));
        assert_eq!(transition(Waiting, Start), None);
        assert_eq!(transition(Running, Pause), Some(Paused));
        assert_eq!(transition(Running, Resume), Some(Waiting));
        assert_eq!(transition(Paused, Resume), Some(Waiting));
        assert_eq!(transition(Paused, Pause), None);
        assert_eq!(transition(Stopped, Start), None);
        assert_eq!(transition(Stopped, Stop), Some(Stopped));
    }

    #[test]
    fn handle_clones_share_resolution() {
        let handle = StateChangeHandle::pending();
        let clone = handle.clone();
        assert!(!clone.is_resolved());
        handle.resolve(WorkerState::Paused);
        assert_eq!(clone.wait(), WorkerState::Paused);
        assert_eq!(clone.wait_timeout(Duration::ZERO), Some(WorkerState::Paused));
    }

    #[test]
    fn submit_while_pending_returns_same_handle() {
        let core = WorkerCore::new("test", Some(Duration::from_millis(5)));
        core.set_state(WorkerState::Waiting);
        let (first, _) = core.submit(WorkerRequest::Pause).unwrap();
        let (second, _) = core.submit(WorkerRequest::Stop).unwrap();
        assert!(!first.is_resolved());
        first.resolve(WorkerState::Paused);
        assert_eq!(second.wait(), WorkerState::Paused);
    }

    #[test]
    fn pause_on_created_worker_is_invalid() {
        let core = WorkerCore::new("test", None);
        let err = core.submit(WorkerRequest::Pause).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidState { .. }));
    }

    #[test]
    fn stop_on_created_worker_resolves_without_a_loop() {
        let core = WorkerCore::new("test", None);
        let (handle, needs_loop) = core.submit(WorkerRequest::Stop).unwrap();
        assert!(!needs_loop);
        assert_eq!(handle.wait(), WorkerState::Stopped);
        assert_eq!(core.state(), WorkerState::Stopped);
    }

    #[test]
    fn submit_cancels_the_cycle_token() {
        let core = WorkerCore::new("test", Some(Duration::from_millis(5)));
        core.set_state(WorkerState::Waiting);
        let token = core.token();
        core.submit(WorkerRequest::Pause).unwrap();
        assert!(token.is_cancelled());
    }
}
