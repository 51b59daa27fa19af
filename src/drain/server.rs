//! Server side of the drain protocol.
//!
//! # Responsibilities
//! - Answer probes without touching node state
//! - Apply requested drain modes in order, one acknowledgement per mode
//! - Trigger the node stop once a shutdown drain finishes
//!
//! # Design Decisions
//! - The drain runs in its own task: a client disconnecting mid-stream
//!   does not abandon a half-applied drain
//! - The first failing mode ends the stream with that error; later modes
//!   are not attempted and the node is not stopped

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::drain::protocol::{DrainMode, DrainRequest, DrainResponse};
use crate::lifecycle::shutdown::Stopper;
use crate::lifecycle::state::Lifecycle;
use crate::observability::metrics;

#[derive(Debug, Clone, Error)]
pub enum DrainError {
    #[error("timed out after {waited_ms}ms waiting for {mode} work to finish ({active} still active)")]
    Timeout { mode: DrainMode, waited_ms: u64, active: u64 },
    #[error("failed to drain {mode}: {reason}")]
    Failed { mode: DrainMode, reason: String },
}

/// Something that can stop admitting work of a given mode and wait for the
/// work already admitted to finish.
pub trait Drainer: Send + Sync + 'static {
    fn drain(&self, mode: DrainMode) -> BoxFuture<'_, Result<(), DrainError>>;
}

pub type DrainResponseStream = BoxStream<'static, Result<DrainResponse, DrainError>>;

/// Handles drain requests for one node.
#[derive(Clone)]
pub struct DrainService {
    drainer: Arc<dyn Drainer>,
    stopper: Stopper,
    lifecycle: Lifecycle,
}

impl DrainService {
    pub fn new(drainer: Arc<dyn Drainer>, stopper: Stopper, lifecycle: Lifecycle) -> Self {
        Self {
            drainer,
            stopper,
            lifecycle,
        }
    }

    /// Process one drain request, streaming an acknowledgement per mode.
    pub fn handle_drain(&self, request: DrainRequest) -> DrainResponseStream {
        metrics::record_drain_request(request.kind());

        if request.is_probe() {
            tracing::debug!("Drain probe answered");
            return stream::once(async { Ok(DrainResponse::default()) }).boxed();
        }

        tracing::info!(
            modes = ?request.modes,
            shutdown = request.shutdown,
            "Drain requested"
        );

        let (tx, rx) = mpsc::channel(request.modes.len().max(1));
        let service = self.clone();
        tokio::spawn(async move { service.apply(request, tx).await });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }

    async fn apply(&self, request: DrainRequest, progress: mpsc::Sender<Result<DrainResponse, DrainError>>) {
        let mut drained = Vec::with_capacity(request.modes.len());

        for mode in request.modes {
            if let Err(e) = self.drainer.drain(mode).await {
                tracing::warn!(mode = %mode, error = %e, "Drain mode failed");
                let _ = progress.send(Err(e)).await;
                return;
            }

            drained.push(mode);
            tracing::info!(mode = %mode, "Drain mode complete");
            // A departed client does not cancel the drain.
            let _ = progress.send(Ok(DrainResponse { on: drained.clone() })).await;
        }

        if request.shutdown {
            if self.lifecycle.note_stop_requested() {
                tracing::info!("Stopping node after drain");
            }
            self.stopper.request_stop();
        }
    }
}
