//! Shutdown escalation policy.
//!
//! # Decision Table
//! ```text
//! SecondSignal, or already shutting down  → ForceKill
//! phase = Draining                        → ForceKill
//! phase = Failed                          → FailFast
//! phase = Stopped                         → Ignore
//! phase = NotStarted | Starting           → EarlyStop
//! phase = Running                         → BeginDrain
//! ```
//!
//! # Design Decisions
//! - Pure function; the caller applies the result under the lifecycle lock
//! - A repeated signal always escalates, even if its class alone would only
//!   begin another drain
//! - Only a confirmed RUNNING node is ever drained

use crate::lifecycle::signals::SignalClass;
use crate::lifecycle::state::Phase;

/// What the control loop does with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Startup already failed; report that failure.
    FailFast,
    /// Nothing is serving yet; stop without draining.
    EarlyStop,
    /// Drain the running node, then stop.
    BeginDrain,
    /// Abandon any graceful shutdown and terminate now.
    ForceKill,
    /// Nothing left to stop.
    Ignore,
}

pub fn decide(class: SignalClass, phase: Phase, already_shutting_down: bool) -> Action {
    if class == SignalClass::SecondSignal || already_shutting_down {
        return Action::ForceKill;
    }

    match phase {
        Phase::Running => Action::BeginDrain,
        Phase::NotStarted | Phase::Starting => Action::EarlyStop,
        Phase::Draining => Action::ForceKill,
        Phase::Failed => Action::FailFast,
        Phase::Stopped => Action::Ignore,
    }
}
