//! Node work categories and their drain.

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::drain::protocol::DrainMode;
use crate::drain::server::{DrainError, Drainer};
use crate::net::connection::WorkTracker;

/// In-flight work of a node, one tracker per drain mode.
#[derive(Debug, Clone)]
pub struct NodeWork {
    pub clients: WorkTracker,
    pub internal: WorkTracker,
    /// Longest wait for one mode's in-flight work.
    mode_timeout: Duration,
}

impl NodeWork {
    pub fn new(mode_timeout: Duration) -> Self {
        Self {
            clients: WorkTracker::new("clients"),
            internal: WorkTracker::new("internal"),
            mode_timeout,
        }
    }

    pub fn tracker(&self, mode: DrainMode) -> &WorkTracker {
        match mode {
            DrainMode::Clients => &self.clients,
            DrainMode::Internal => &self.internal,
        }
    }
}

impl Drainer for NodeWork {
    fn drain(&self, mode: DrainMode) -> BoxFuture<'_, Result<(), DrainError>> {
        Box::pin(async move {
            let tracker = self.tracker(mode);
            tracker.close_gate();

            if tokio::time::timeout(self.mode_timeout, tracker.wait_idle()).await.is_err() {
                return Err(DrainError::Timeout {
                    mode,
                    waited_ms: self.mode_timeout.as_millis() as u64,
                    active: tracker.active_count(),
                });
            }
            Ok(())
        })
    }
}
