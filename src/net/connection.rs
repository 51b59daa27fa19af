//! Admission gates and in-flight work tracking.
//!
//! # Responsibilities
//! - Admit work while the gate is open (Accepting → Draining)
//! - Generate unique work IDs for tracing
//! - Count in-flight work and wait for it to reach zero

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Global counter for work IDs. Only uniqueness is needed.
static WORK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one admitted unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(u64);

impl WorkId {
    pub fn new() -> Self {
        Self(WORK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

/// Gate state of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// New work is admitted.
    Accepting,
    /// No new work; in-flight work is finishing.
    Draining,
}

#[derive(Debug)]
struct TrackerInner {
    accepting: AtomicBool,
    active: AtomicU64,
    idle: Notify,
}

/// Tracks one category of work for draining.
#[derive(Debug, Clone)]
pub struct WorkTracker {
    name: &'static str,
    inner: Arc<TrackerInner>,
}

impl WorkTracker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(TrackerInner {
                accepting: AtomicBool::new(true),
                active: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Admit a unit of work. Returns `None` once the gate is closed.
    pub fn try_admit(&self) -> Option<WorkGuard> {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let guard = WorkGuard {
            inner: Arc::clone(&self.inner),
            id: WorkId::new(),
            tracker: self.name,
        };
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return None;
        }
        tracing::trace!(tracker = self.name, work_id = %guard.id, "Work admitted");
        Some(guard)
    }

    /// Stop admitting new work. Idempotent.
    pub fn close_gate(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(
                tracker = self.name,
                active = self.active_count(),
                "Stopped admitting new work"
            );
        }
    }

    pub fn gate_state(&self) -> GateState {
        if self.inner.accepting.load(Ordering::SeqCst) {
            GateState::Accepting
        } else {
            GateState::Draining
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until no admitted work remains.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps one unit of work counted until dropped.
#[derive(Debug)]
pub struct WorkGuard {
    inner: Arc<TrackerInner>,
    id: WorkId,
    tracker: &'static str,
}

impl WorkGuard {
    pub fn id(&self) -> WorkId {
        self.id
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
        tracing::trace!(tracker = self.tracker, work_id = %self.id, "Work finished");
    }
}
