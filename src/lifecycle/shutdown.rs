//! Stop coordination for the node.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Progress of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopState {
    Running,
    /// Stop requested; registered tasks are winding down.
    Stopping,
    /// Every registered task has finished.
    Stopped,
}

#[derive(Debug)]
struct StopperInner {
    state: watch::Sender<StopState>,
    tasks: AtomicUsize,
    idle: Notify,
}

impl StopperInner {
    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.tasks.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Coordinator for stopping the node's long-running tasks.
///
/// Tasks register through [`Stopper::spawn`] or [`Stopper::track`] and watch
/// [`Stopper::should_stop`]. Once a stop is requested no new task is
/// admitted, and the stopper reports stopped when the last one finishes.
#[derive(Debug, Clone)]
pub struct Stopper {
    inner: Arc<StopperInner>,
}

impl Stopper {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StopState::Running);
        Self {
            inner: Arc::new(StopperInner {
                state,
                tasks: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> StopState {
        *self.inner.state.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.state() != StopState::Running
    }

    /// Number of registered tasks still running.
    pub fn num_tasks(&self) -> usize {
        self.inner.tasks.load(Ordering::SeqCst)
    }

    /// Ask every registered task to stop. Idempotent.
    pub fn request_stop(&self) {
        let first = self.inner.state.send_if_modified(|state| {
            if *state == StopState::Running {
                *state = StopState::Stopping;
                true
            } else {
                false
            }
        });
        if !first {
            return;
        }

        tracing::info!(running_tasks = self.num_tasks(), "Stop requested");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.wait_idle().await;
            inner.state.send_replace(StopState::Stopped);
            tracing::info!("All tasks stopped");
        });
    }

    /// Resolves once a stop has been requested.
    pub async fn should_stop(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state >= StopState::Stopping).await;
    }

    /// Resolves once every registered task has finished after a stop request.
    pub async fn is_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == StopState::Stopped).await;
    }

    /// Register a unit of work. Returns `None` once stopping.
    pub fn track(&self) -> Option<TaskGuard> {
        self.inner.tasks.fetch_add(1, Ordering::SeqCst);
        let guard = TaskGuard {
            inner: Arc::clone(&self.inner),
        };
        if self.is_stopping() {
            // Dropping the guard wakes the idle waiter if this was the last one.
            drop(guard);
            return None;
        }
        Some(guard)
    }

    /// Spawn a registered task. Returns `None` once stopping.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(guard) = self.track() else {
            tracing::debug!(task = name, "Refusing to start task, node is stopping");
            return None;
        };
        Some(tokio::spawn(async move {
            let _guard = guard;
            task.await;
            tracing::debug!(task = name, "Task finished");
        }))
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a task registered with its [`Stopper`] until dropped.
#[derive(Debug)]
pub struct TaskGuard {
    inner: Arc<StopperInner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.inner.tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
