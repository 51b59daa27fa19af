//! Client side of the drain protocol: quitting a node.
//!
//! # Data Flow
//! ```text
//! request_shutdown()
//!   → decommission (optional; failure aborts)
//!   → do_shutdown(graceful modes), bounded by timeout
//!        ok                        → Graceful
//!        timed out / TryHard error → do_shutdown(no modes) → Hard
//!        any other error           → returned as is
//!
//! do_shutdown()
//!   → probe (node must answer)
//!   → drain request with shutdown = true
//!   → consume progress until the stream ends or the node closes the connection
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;

use crate::config::ShutdownConfig;
use crate::drain::protocol::{DrainMode, DrainRequest, GRACEFUL_DRAIN_MODES};
use crate::drain::transport::{DrainTransport, TransportError};

pub const DEFAULT_QUIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum QuitError {
    #[error("node is not reachable: {0}")]
    Unreachable(#[source] TransportError),
    #[error("error sending drain request: {0}")]
    Send(#[source] TransportError),
    /// The node accepted the drain but failed while performing it.
    #[error("{0}")]
    TryHardShutdown(#[source] TransportError),
    #[error("failed to decommission node: {0}")]
    Decommission(#[source] TransportError),
    #[error("hard shutdown failed: {0}")]
    HardShutdownFailed(#[source] Box<QuitError>),
}

impl QuitError {
    pub fn should_try_hard_shutdown(&self) -> bool {
        matches!(self, QuitError::TryHardShutdown(_))
    }
}

#[derive(Debug, Clone)]
pub struct QuitOptions {
    pub modes: Vec<DrainMode>,
    pub decommission: bool,
    /// Bound on the graceful attempt before falling back to a hard shutdown.
    pub timeout: Duration,
}

impl Default for QuitOptions {
    fn default() -> Self {
        Self {
            modes: GRACEFUL_DRAIN_MODES.to_vec(),
            decommission: false,
            timeout: DEFAULT_QUIT_TIMEOUT,
        }
    }
}

impl From<&ShutdownConfig> for QuitOptions {
    fn from(config: &ShutdownConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.quit_timeout_secs),
            ..Default::default()
        }
    }
}

/// Why a quit fell back to a hard shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardShutdownReason {
    TimedOut,
    GracefulFailed(String),
}

impl std::fmt::Display for HardShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardShutdownReason::TimedOut => write!(f, "timed out; proceeding with hard shutdown"),
            HardShutdownReason::GracefulFailed(e) => {
                write!(f, "graceful shutdown failed: {e}; proceeding with hard shutdown")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitOutcome {
    Graceful,
    Hard(HardShutdownReason),
}

/// Probe the node. Fails only if the probe cannot be sent; errors on the
/// response stream are logged and otherwise ignored.
pub async fn check_node_running<T>(transport: &T) -> Result<(), QuitError>
where
    T: DrainTransport + ?Sized,
{
    let mut responses = transport
        .drain(DrainRequest::probe())
        .await
        .map_err(QuitError::Unreachable)?;

    while let Some(item) = responses.next().await {
        if let Err(e) = item {
            tracing::warn!(error = %e, "Unexpected error while probing node");
            break;
        }
    }
    Ok(())
}

/// Ask the node to drain `modes` and stop. An empty `modes` is a hard shutdown.
pub async fn do_shutdown<T>(transport: &T, modes: &[DrainMode]) -> Result<(), QuitError>
where
    T: DrainTransport + ?Sized,
{
    check_node_running(transport).await?;

    let mut responses = match transport.drain(DrainRequest::shutdown_after(modes.to_vec())).await {
        Ok(responses) => responses,
        // The node already stopped.
        Err(e) if e.is_closed_connection() => return Ok(()),
        Err(e) => return Err(QuitError::Send(e)),
    };

    while let Some(item) = responses.next().await {
        match item {
            Ok(progress) => tracing::info!(drained = ?progress.on, "Drain progress"),
            Err(e) if e.is_closed_connection() => return Ok(()),
            Err(e) => return Err(QuitError::TryHardShutdown(e)),
        }
    }
    Ok(())
}

/// Quit the node, falling back to a hard shutdown when the graceful
/// attempt fails in the node or runs out of time.
pub async fn request_shutdown<T>(transport: &T, options: &QuitOptions) -> Result<QuitOutcome, QuitError>
where
    T: DrainTransport + ?Sized,
{
    if options.decommission {
        transport.decommission().await.map_err(QuitError::Decommission)?;
        tracing::info!("Node decommissioned");
    }

    let reason = match tokio::time::timeout(options.timeout, do_shutdown(transport, &options.modes)).await {
        Ok(Ok(())) => return Ok(QuitOutcome::Graceful),
        Ok(Err(e)) if e.should_try_hard_shutdown() => HardShutdownReason::GracefulFailed(e.to_string()),
        Ok(Err(e)) => return Err(e),
        Err(_) => HardShutdownReason::TimedOut,
    };
    tracing::warn!(reason = %reason, "Falling back to hard shutdown");

    do_shutdown(transport, &[])
        .await
        .map_err(|e| QuitError::HardShutdownFailed(Box::new(e)))?;
    Ok(QuitOutcome::Hard(reason))
}
