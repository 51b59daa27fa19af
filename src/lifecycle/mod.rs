//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Background task: init → serve (listeners) → RUNNING
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGQUIT → channel → orchestrator
//!
//! Decision (state.rs + escalation.rs):
//!     classify signal + decide action + apply transition, under one lock
//!
//! Shutdown (orchestrator.rs + shutdown.rs):
//!     BeginDrain → drain modes → Stopper::request_stop → tasks finish → exit
//!     EarlyStop  → Stopper::request_stop → exit
//!     ForceKill  → exit 128+signal
//! ```
//!
//! # Design Decisions
//! - Only a node confirmed RUNNING is drained
//! - Shutdown has a time limit: hard exit after the grace period
//! - A second signal always skips the rest of a graceful shutdown

pub mod escalation;
pub mod exit;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use escalation::{decide, Action};
pub use exit::ExitDecision;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use shutdown::{StopState, Stopper};
pub use signals::{Signal, SignalClass, SignalEvent};
pub use state::{Lifecycle, LifecycleSnapshot, Phase};
