//! Shared lifecycle state.
//!
//! # Responsibilities
//! - Own the node phase and the "shutting down" flag
//! - Apply every phase transition under one lock
//! - Classify signals and apply the escalation decision atomically
//!
//! # Phase Machine
//! ```text
//! NotStarted → Starting → Running → Draining → Stopped
//!                  │          │
//!                  │          └──(remote stop)──→ Draining
//!                  ├──(init/serve error)──→ Failed
//!                  └──(early stop)──→ Stopped
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::lifecycle::escalation::{self, Action};
use crate::lifecycle::signals::{Signal, SignalEvent};
use crate::observability::metrics;

/// Lifecycle phase of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Starting,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Stopped | Phase::Failed)
    }

    /// Numeric value exported on the phase gauge.
    pub(crate) fn ordinal(&self) -> u8 {
        match self {
            Phase::NotStarted => 0,
            Phase::Starting => 1,
            Phase::Running => 2,
            Phase::Draining => 3,
            Phase::Stopped => 4,
            Phase::Failed => 5,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot {
    pub phase: Phase,
    pub shutting_down: bool,
    pub drain_issued: bool,
}

#[derive(Debug)]
struct LifecycleState {
    phase: Phase,
    shutting_down: bool,
    drain_issued: bool,
}

impl LifecycleState {
    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            tracing::debug!(from = %self.phase, to = %next, "Lifecycle transition");
            self.phase = next;
            metrics::record_phase(next);
        }
    }
}

/// Handle to the node's lifecycle state.
///
/// Cloned into the control loop, the startup task and the drain endpoint.
/// All of them read and write the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<Mutex<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LifecycleState {
                phase: Phase::NotStarted,
                shutting_down: false,
                drain_issued: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        // No critical section leaves the state half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.lock();
        LifecycleSnapshot {
            phase: state.phase,
            shutting_down: state.shutting_down,
            drain_issued: state.drain_issued,
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// NotStarted → Starting. Returns false if the node was already started.
    pub fn begin_starting(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::NotStarted {
            return false;
        }
        state.set_phase(Phase::Starting);
        true
    }

    /// Starting → Running.
    ///
    /// Returns false when a stop already moved the node past STARTING; the
    /// node must then not be treated as serving.
    pub fn mark_running(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Starting || state.shutting_down {
            return false;
        }
        state.set_phase(Phase::Running);
        true
    }

    /// Starting → Failed. Returns false if the phase had already moved on.
    pub fn mark_failed(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Starting {
            return false;
        }
        state.set_phase(Phase::Failed);
        true
    }

    /// Move any non-terminal phase to Stopped.
    pub fn mark_stopped(&self) {
        let mut state = self.lock();
        if !state.phase.is_terminal() {
            state.set_phase(Phase::Stopped);
        }
        state.shutting_down = true;
    }

    /// Record a stop requested through the drain endpoint.
    ///
    /// Returns true if this call is what started the shutdown.
    pub fn note_stop_requested(&self) -> bool {
        let mut state = self.lock();
        let first = !state.shutting_down;
        state.shutting_down = true;
        if state.phase == Phase::Running {
            state.set_phase(Phase::Draining);
        }
        first
    }

    /// Classify a signal, decide the action and apply its transition in a
    /// single critical section.
    pub fn on_signal(&self, signal: Signal) -> (SignalEvent, Action) {
        let mut state = self.lock();
        let event = SignalEvent::classify(signal, state.shutting_down);
        let action = escalation::decide(event.class(), state.phase, state.shutting_down);

        match action {
            Action::BeginDrain => {
                state.set_phase(Phase::Draining);
                state.shutting_down = true;
                state.drain_issued = true;
            }
            Action::EarlyStop => {
                state.set_phase(Phase::Stopped);
                state.shutting_down = true;
            }
            Action::ForceKill => state.shutting_down = true,
            Action::FailFast | Action::Ignore => {}
        }

        (event, action)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
