//! Startup orchestration.
//!
//! # Responsibilities
//! - Run node initialization, then serving, as one background task
//! - Report the outcome exactly once on a single-slot channel
//! - Move the lifecycle out of STARTING exactly once
//! - Name the configuration option to change on a listen-address conflict
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Serving is skipped when a stop won the race against initialization
//! - Listeners start last (traffic only when ready)

use std::time::Instant;

use tokio::sync::oneshot;

use crate::lifecycle::shutdown::Stopper;
use crate::lifecycle::state::Lifecycle;
use crate::node::{Node, StartError};

const LISTEN_HINT: &str = "consider changing the port via";

/// Listen addresses and the configuration options that set them.
#[derive(Debug, Clone)]
pub struct ListenHints {
    pub client_address: String,
    pub admin_address: String,
}

impl ListenHints {
    fn option_for(&self, address: &str) -> Option<&'static str> {
        if address == self.client_address {
            Some("listener.client_address")
        } else if address == self.admin_address {
            Some("admin.bind_address")
        } else {
            None
        }
    }
}

/// Operator-facing description of a startup failure.
pub fn describe_failure(err: &StartError, hints: &ListenHints) -> String {
    match err {
        StartError::ListenConflict { address, .. } => match hints.option_for(address) {
            Some(option) => format!("{err}; {LISTEN_HINT} `{option}`"),
            None => err.to_string(),
        },
        _ => err.to_string(),
    }
}

/// Background startup task. Sends its outcome on `outcome` once finished.
pub(crate) async fn run_startup<N: Node>(
    mut node: N,
    lifecycle: Lifecycle,
    stopper: Stopper,
    outcome: oneshot::Sender<Result<(), StartError>>,
) {
    let started = Instant::now();
    let result = start(&mut node, &lifecycle, &stopper).await;

    match &result {
        Ok(()) => tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Startup task finished"
        ),
        Err(e) => {
            lifecycle.mark_failed();
            tracing::error!(error = %e, "Node startup failed");
        }
    }

    // The control loop stops listening once it has moved on to shutdown.
    let _ = outcome.send(result);
}

async fn start<N: Node>(node: &mut N, lifecycle: &Lifecycle, stopper: &Stopper) -> Result<(), StartError> {
    node.init().await?;

    if lifecycle.is_shutting_down() {
        tracing::info!("Stop requested during initialization; not starting listeners");
        return Ok(());
    }

    node.serve(stopper.clone()).await?;

    if !lifecycle.mark_running() {
        tracing::info!("Stop requested while listeners came up; node will not be drained");
        return Ok(());
    }

    tracing::info!("Node is running");
    Ok(())
}
