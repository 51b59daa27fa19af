//! Process exit decisions.

use std::fmt;

use serde::Serialize;

use crate::lifecycle::signals::Signal;

pub const EXIT_SUCCESS: i32 = 0;
/// Graceful shutdown that was started by an interrupt.
pub const EXIT_INTERRUPTED: i32 = 1;
pub const EXIT_STARTUP_FAILED: i32 = 2;
pub const EXIT_SHUTDOWN_TIMEOUT: i32 = 3;

/// Appended to every hard-shutdown cause.
pub const HARD_SHUTDOWN_HINT: &str =
    " - node may take longer to restart & clients may need to wait for leases to expire";

pub const MSG_DRAINED: &str = "server drained and shutdown completed";
pub const MSG_TOO_EARLY: &str = "too early to drain; used hard shutdown instead";
pub const MSG_STOPPED_REMOTELY: &str = "server shutdown requested through drain; shutdown completed";
pub const MSG_INTERRUPTED: &str = "interrupted";
pub const MSG_GRACEFUL_SHUTDOWN: &str = "initiating graceful shutdown of server";
pub const MSG_SECOND_INTERRUPT_NOTE: &str =
    "Note: a second interrupt will skip graceful shutdown and terminate forcefully";

/// How the process should exit, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitDecision {
    pub exit_code: i32,
    pub cause: String,
    /// The cause should be shown to the operator, not only logged.
    pub user_facing: bool,
}

impl ExitDecision {
    pub fn success(cause: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_SUCCESS,
            cause: cause.into(),
            user_facing: false,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            exit_code: EXIT_INTERRUPTED,
            cause: MSG_INTERRUPTED.to_string(),
            user_facing: true,
        }
    }

    pub fn fatal(cause: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_STARTUP_FAILED,
            cause: cause.into(),
            user_facing: true,
        }
    }

    /// A signal arrived while already shutting down.
    pub fn forced(signal: Signal) -> Self {
        Self {
            exit_code: signal.forced_exit_code(),
            cause: format!(
                "received signal '{}' during shutdown, initiating hard shutdown{}",
                signal, HARD_SHUTDOWN_HINT
            ),
            user_facing: true,
        }
    }

    /// The graceful shutdown did not finish within its time limit.
    pub fn timed_out() -> Self {
        Self {
            exit_code: EXIT_SHUTDOWN_TIMEOUT,
            cause: format!("time limit reached, initiating hard shutdown{}", HARD_SHUTDOWN_HINT),
            user_facing: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }

    /// Short label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self.exit_code {
            EXIT_SUCCESS => "completed",
            EXIT_INTERRUPTED => "interrupted",
            EXIT_STARTUP_FAILED => "startup_failed",
            EXIT_SHUTDOWN_TIMEOUT => "timed_out",
            _ => "forced",
        }
    }

    /// Finish a tentative decision once the shutdown completed on its own.
    ///
    /// A non-success cause (an interrupt) is kept so the process still
    /// reports how the shutdown began.
    pub(crate) fn completed(self, message: &str) -> Self {
        if self.is_success() {
            ExitDecision::success(message)
        } else {
            self
        }
    }
}

impl fmt::Display for ExitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit code {})", self.cause, self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_carries_signal_and_hint() {
        let decision = ExitDecision::forced(Signal::TERMINATE);
        assert_eq!(decision.exit_code, 143);
        assert!(decision.cause.contains("'terminated'"));
        assert!(decision.cause.ends_with(HARD_SHUTDOWN_HINT));
    }

    #[test]
    fn completed_keeps_interrupt() {
        let decision = ExitDecision::interrupted().completed(MSG_DRAINED);
        assert_eq!(decision.exit_code, EXIT_INTERRUPTED);
        assert_eq!(decision.cause, MSG_INTERRUPTED);

        let decision = ExitDecision::success("pending").completed(MSG_DRAINED);
        assert_eq!(decision.cause, MSG_DRAINED);
        assert!(!decision.user_facing);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(ExitDecision::timed_out().outcome(), "timed_out");
        assert_eq!(ExitDecision::forced(Signal::INTERRUPT).outcome(), "forced");
        assert_eq!(ExitDecision::fatal("boom").outcome(), "startup_failed");
    }
}
