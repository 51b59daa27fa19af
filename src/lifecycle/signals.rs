//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM and SIGQUIT
//! - Forward every delivery to the control loop over a bounded channel
//! - Classify deliveries into interrupt / terminate / second-signal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered before startup begins so nothing is missed
//! - Any delivery while already shutting down is a `SecondSignal`, whatever
//!   its own class (classification happens under the lifecycle lock)

use std::fmt;
use tokio::sync::mpsc;

/// Capacity of the signal channel. Repeated deliveries beyond this are
/// redundant: the second one already forces a hard shutdown.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 8;

/// A delivered OS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    number: i32,
    name: &'static str,
}

impl Signal {
    /// SIGINT, usually Ctrl-C at a terminal.
    pub const INTERRUPT: Signal = Signal { number: 2, name: "interrupt" };
    /// SIGQUIT, handled like SIGTERM.
    pub const QUIT: Signal = Signal { number: 3, name: "quit" };
    /// SIGTERM, usually sent by a process supervisor.
    pub const TERMINATE: Signal = Signal { number: 15, name: "terminated" };

    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Class of this signal when it is the first one received.
    pub fn class(&self) -> SignalClass {
        if *self == Signal::INTERRUPT {
            SignalClass::Interrupt
        } else {
            SignalClass::Terminate
        }
    }

    /// Exit code of a process killed by this signal (128 + signal number).
    pub fn forced_exit_code(&self) -> i32 {
        128 + self.number
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Signal class as seen by the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    /// User initiated. Graceful, but reported with a non-zero exit code.
    Interrupt,
    /// Supervisor initiated. Graceful, reported as success.
    Terminate,
    /// Anything received while already shutting down.
    SecondSignal,
}

/// A signal classified at receipt time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Interrupt(Signal),
    Terminate(Signal),
    SecondSignal(Signal),
}

impl SignalEvent {
    pub fn classify(signal: Signal, shutting_down: bool) -> Self {
        if shutting_down {
            return SignalEvent::SecondSignal(signal);
        }
        match signal.class() {
            SignalClass::Interrupt => SignalEvent::Interrupt(signal),
            _ => SignalEvent::Terminate(signal),
        }
    }

    pub fn signal(&self) -> Signal {
        match self {
            SignalEvent::Interrupt(s) | SignalEvent::Terminate(s) | SignalEvent::SecondSignal(s) => *s,
        }
    }

    pub fn class(&self) -> SignalClass {
        match self {
            SignalEvent::Interrupt(_) => SignalClass::Interrupt,
            SignalEvent::Terminate(_) => SignalClass::Terminate,
            SignalEvent::SecondSignal(_) => SignalClass::SecondSignal,
        }
    }
}

/// Register the termination signal handlers and return the receiving end
/// of the delivery channel.
///
/// Must be called from within the Tokio runtime.
#[cfg(unix)]
pub fn install() -> std::io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigint.recv() => Signal::INTERRUPT,
                Some(()) = sigterm.recv() => Signal::TERMINATE,
                Some(()) = sigquit.recv() => Signal::QUIT,
                else => break,
            };
            tracing::debug!(signal = %received, "Signal delivered");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    tracing::debug!("Signal handlers installed");
    Ok(rx)
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Signal::INTERRUPT).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_keeps_its_class() {
        assert_eq!(
            SignalEvent::classify(Signal::INTERRUPT, false),
            SignalEvent::Interrupt(Signal::INTERRUPT)
        );
        assert_eq!(
            SignalEvent::classify(Signal::TERMINATE, false),
            SignalEvent::Terminate(Signal::TERMINATE)
        );
        assert_eq!(
            SignalEvent::classify(Signal::QUIT, false),
            SignalEvent::Terminate(Signal::QUIT)
        );
    }

    #[test]
    fn any_signal_while_shutting_down_is_second() {
        for signal in [Signal::INTERRUPT, Signal::TERMINATE, Signal::QUIT] {
            let event = SignalEvent::classify(signal, true);
            assert_eq!(event.class(), SignalClass::SecondSignal);
            assert_eq!(event.signal(), signal);
        }
    }

    #[test]
    fn forced_exit_code_is_128_plus_number() {
        assert_eq!(Signal::INTERRUPT.forced_exit_code(), 130);
        assert_eq!(Signal::TERMINATE.forced_exit_code(), 143);
        assert_eq!(Signal::QUIT.forced_exit_code(), 131);
    }
}
