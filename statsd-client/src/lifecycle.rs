use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const CLOSED: u8 = 2;

/// Client lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting and delivering lines.
    Running,

    /// No longer accepting lines; consumers are draining what was already queued.
    ShuttingDown,

    /// Consumers have stopped and the socket is closed.
    Closed,
}

/// One-way `Running → ShuttingDown → Closed` state machine shared between the client and its consumers.
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle { state: AtomicU8::new(RUNNING) }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => LifecycleState::Running,
            SHUTTING_DOWN => LifecycleState::ShuttingDown,
            _ => LifecycleState::Closed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Moves from `Running` to `ShuttingDown`.
    ///
    /// Only one caller ever gets `true`; every other call, concurrent or later, gets `false`.
    pub fn begin_shutdown(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }
}
