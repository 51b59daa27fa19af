//! Node control loop.
//!
//! # Responsibilities
//! - Start the node in the background and watch for its outcome
//! - Turn signals into drain, early stop or hard shutdown
//! - Bound the graceful shutdown by a time limit
//! - Produce one [`ExitDecision`] for the process
//!
//! # Data Flow
//! ```text
//! run()
//!   → spawn startup task (init → serve → RUNNING)
//!   → wait for: startup failure | external stop | signal
//!        failure        → stop spawned tasks → fatal decision
//!        external stop  → wait until stopped
//!        signal         → Lifecycle::on_signal → Action
//!             BeginDrain → drain task + progress reporter → race(stopped, signal, time limit)
//!             EarlyStop  → request stop → race(stopped, signal, confirmation wait)
//!             ForceKill  → forced decision
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::drain::protocol::DrainRequest;
use crate::drain::server::DrainService;
use crate::lifecycle::escalation::Action;
use crate::lifecycle::exit::{
    ExitDecision, MSG_DRAINED, MSG_GRACEFUL_SHUTDOWN, MSG_SECOND_INTERRUPT_NOTE, MSG_STOPPED_REMOTELY,
    MSG_TOO_EARLY,
};
use crate::lifecycle::shutdown::Stopper;
use crate::lifecycle::signals::{Signal, SignalEvent};
use crate::lifecycle::startup::{self, ListenHints};
use crate::lifecycle::state::Lifecycle;
use crate::node::{Node, StartError};
use crate::observability::metrics;

/// Timing and presentation settings for the control loop.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on a graceful drain-and-stop.
    pub grace_period: Duration,
    /// Interval of the running-task progress log while draining.
    pub progress_interval: Duration,
    /// How long an early stop waits for the stopper to confirm.
    pub early_stop_wait: Duration,
    /// Also print operator notices on stdout.
    pub echo_notices: bool,
    pub listen_hints: ListenHints,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        OrchestratorSettings::from(&NodeConfig::default())
    }
}

impl From<&NodeConfig> for OrchestratorSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            grace_period: Duration::from_secs(config.shutdown.grace_period_secs),
            progress_interval: Duration::from_secs(config.shutdown.progress_interval_secs),
            early_stop_wait: Duration::from_secs(config.shutdown.early_stop_wait_secs),
            echo_notices: config.shutdown.echo_notices,
            listen_hints: ListenHints {
                client_address: config.listener.client_address.clone(),
                admin_address: config.admin.bind_address.clone(),
            },
        }
    }
}

/// How a wait for the stopper ended.
enum StopWait {
    Stopped,
    Forced(Signal),
    TimedOut,
}

/// Drives one node from start to exit.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    lifecycle: Lifecycle,
    stopper: Stopper,
    drain: DrainService,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, lifecycle: Lifecycle, stopper: Stopper, drain: DrainService) -> Self {
        Self {
            settings,
            lifecycle,
            stopper,
            drain,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    /// Start `node` and run until the process should exit.
    ///
    /// `signals` must already be registered so that nothing delivered
    /// during initialization is lost.
    pub async fn run<N: Node>(self, node: N, mut signals: mpsc::Receiver<Signal>) -> ExitDecision {
        let decision = self.control_loop(node, &mut signals).await;
        self.lifecycle.mark_stopped();
        metrics::record_shutdown(decision.outcome());

        if decision.is_success() {
            tracing::info!(exit_code = decision.exit_code, cause = %decision.cause, "Node exiting");
        } else {
            tracing::warn!(exit_code = decision.exit_code, cause = %decision.cause, "Node exiting");
        }
        decision
    }

    async fn control_loop<N: Node>(&self, node: N, signals: &mut mpsc::Receiver<Signal>) -> ExitDecision {
        if !self.lifecycle.begin_starting() {
            return ExitDecision::fatal("node lifecycle was already started");
        }

        let (outcome_tx, mut outcome_rx) = oneshot::channel();
        tokio::spawn(startup::run_startup(
            node,
            self.lifecycle.clone(),
            self.stopper.clone(),
            outcome_tx,
        ));

        let mut startup_settled = false;
        let mut signals_open = true;

        loop {
            tokio::select! {
                outcome = &mut outcome_rx, if !startup_settled => {
                    startup_settled = true;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => return self.abandon_startup(self.fatal(&err), signals).await,
                        Err(_) => return ExitDecision::fatal("startup task ended without reporting an outcome"),
                    }
                }
                () = self.stopper.should_stop() => {
                    return self.await_external_stop(signals).await;
                }
                received = signals.recv(), if signals_open => {
                    let Some(signal) = received else {
                        tracing::warn!("Signal channel closed; only an external stop can end the node");
                        signals_open = false;
                        continue;
                    };

                    let (event, action) = self.lifecycle.on_signal(signal);
                    tracing::info!(signal = %signal, ?action, "Received signal");

                    match action {
                        Action::BeginDrain => {
                            let tentative = self.tentative_decision(event);
                            return self.drain_and_stop(tentative, signals).await;
                        }
                        Action::EarlyStop => {
                            let tentative = self.tentative_decision(event);
                            return self.stop_early(tentative, signals).await;
                        }
                        Action::ForceKill => return ExitDecision::forced(signal),
                        Action::FailFast => {
                            let decision = if startup_settled {
                                ExitDecision::fatal("node startup failed")
                            } else {
                                match (&mut outcome_rx).await {
                                    Ok(Err(err)) => self.fatal(&err),
                                    _ => ExitDecision::fatal("node startup failed"),
                                }
                            };
                            return self.abandon_startup(decision, signals).await;
                        }
                        Action::Ignore => {}
                    }
                }
            }
        }
    }

    /// Stop whatever startup already spawned before reporting the failure.
    async fn abandon_startup(&self, decision: ExitDecision, signals: &mut mpsc::Receiver<Signal>) -> ExitDecision {
        self.stopper.request_stop();
        match self.wait_stopped(signals, self.settings.early_stop_wait).await {
            StopWait::Stopped => {}
            StopWait::Forced(signal) => return ExitDecision::forced(signal),
            StopWait::TimedOut => tracing::warn!(
                running_tasks = self.stopper.num_tasks(),
                "Tasks of the failed startup did not stop in time"
            ),
        }
        decision
    }

    fn fatal(&self, err: &StartError) -> ExitDecision {
        ExitDecision::fatal(startup::describe_failure(err, &self.settings.listen_hints))
    }

    /// Decision reported if the shutdown that `event` starts completes on its own.
    fn tentative_decision(&self, event: SignalEvent) -> ExitDecision {
        let decision = match event {
            SignalEvent::Interrupt(_) => {
                self.notice(MSG_SECOND_INTERRUPT_NOTE);
                ExitDecision::interrupted()
            }
            _ => ExitDecision::success(MSG_DRAINED),
        };
        self.notice(MSG_GRACEFUL_SHUTDOWN);
        decision
    }

    async fn drain_and_stop(&self, tentative: ExitDecision, signals: &mut mpsc::Receiver<Signal>) -> ExitDecision {
        let _drain = self.spawn_drain();
        let reporter = self.spawn_progress_reporter();

        let decision = match self.wait_stopped(signals, self.settings.grace_period).await {
            StopWait::Stopped => {
                self.notice(MSG_DRAINED);
                tentative.completed(MSG_DRAINED)
            }
            StopWait::Forced(signal) => ExitDecision::forced(signal),
            StopWait::TimedOut => ExitDecision::timed_out(),
        };

        reporter.abort();
        decision
    }

    async fn stop_early(&self, tentative: ExitDecision, signals: &mut mpsc::Receiver<Signal>) -> ExitDecision {
        self.stopper.request_stop();

        match self.wait_stopped(signals, self.settings.early_stop_wait).await {
            StopWait::Stopped => {}
            StopWait::Forced(signal) => return ExitDecision::forced(signal),
            StopWait::TimedOut => tracing::warn!(
                running_tasks = self.stopper.num_tasks(),
                "Stop not confirmed in time; exiting anyway"
            ),
        }

        self.notice(MSG_TOO_EARLY);
        tentative.completed(MSG_TOO_EARLY)
    }

    /// The stopper was triggered by something other than a signal, such as
    /// a drain request with `shutdown` set.
    async fn await_external_stop(&self, signals: &mut mpsc::Receiver<Signal>) -> ExitDecision {
        self.lifecycle.note_stop_requested();
        tracing::info!(running_tasks = self.stopper.num_tasks(), "Stop requested externally; waiting for tasks");

        loop {
            tokio::select! {
                Some(signal) = signals.recv() => {
                    let (_, action) = self.lifecycle.on_signal(signal);
                    if action == Action::ForceKill {
                        return ExitDecision::forced(signal);
                    }
                }
                () = self.stopper.is_stopped() => return ExitDecision::success(MSG_STOPPED_REMOTELY),
            }
        }
    }

    async fn wait_stopped(&self, signals: &mut mpsc::Receiver<Signal>, limit: Duration) -> StopWait {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = self.stopper.is_stopped() => return StopWait::Stopped,
                Some(signal) = signals.recv() => {
                    let (_, action) = self.lifecycle.on_signal(signal);
                    if action == Action::ForceKill {
                        return StopWait::Forced(signal);
                    }
                }
                () = &mut deadline => return StopWait::TimedOut,
            }
        }
    }

    fn spawn_drain(&self) -> JoinHandle<()> {
        let drain = self.drain.clone();
        let stopper = self.stopper.clone();

        tokio::spawn(async move {
            let mut progress = drain.handle_drain(DrainRequest::graceful_shutdown());
            while let Some(item) = progress.next().await {
                match item {
                    Ok(response) => tracing::info!(drained = ?response.on, "Drain progress"),
                    Err(e) => {
                        tracing::warn!(error = %e, "Drain failed; stopping without it");
                        break;
                    }
                }
            }
            stopper.request_stop();
        })
    }

    fn spawn_progress_reporter(&self) -> JoinHandle<()> {
        let stopper = self.stopper.clone();
        let interval = self.settings.progress_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let running = stopper.num_tasks();
                        metrics::record_pending_tasks(running);
                        tracing::info!(running_tasks = running, "{} running tasks", running);
                    }
                    () = stopper.is_stopped() => break,
                }
            }
        })
    }

    fn notice(&self, message: &str) {
        tracing::info!("{}", message);
        if self.settings.echo_notices {
            println!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drain::protocol::DrainMode;
    use crate::drain::server::{DrainError, Drainer};
    use futures_util::future::BoxFuture;
    use std::sync::Arc;

    struct InstantDrainer;

    impl Drainer for InstantDrainer {
        fn drain(&self, _mode: DrainMode) -> BoxFuture<'_, Result<(), DrainError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn orchestrator() -> Orchestrator {
        let settings = OrchestratorSettings {
            progress_interval: Duration::from_millis(10),
            echo_notices: false,
            ..Default::default()
        };
        let lifecycle = Lifecycle::new();
        let stopper = Stopper::new();
        let drain = DrainService::new(Arc::new(InstantDrainer), stopper.clone(), lifecycle.clone());
        Orchestrator::new(settings, lifecycle, stopper, drain)
    }

    #[tokio::test]
    async fn progress_reporter_runs_until_stopped() {
        let orchestrator = orchestrator();
        let held = orchestrator.stopper().track().unwrap();
        let reporter = orchestrator.spawn_progress_reporter();

        orchestrator.stopper().request_stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reporter.is_finished(), "reporter must keep reporting while tasks run");
        assert_eq!(orchestrator.stopper().num_tasks(), 1);

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), reporter)
            .await
            .expect("reporter should exit once stopped")
            .unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_task() {
        let orchestrator = orchestrator();
        assert!(orchestrator.lifecycle().begin_starting());
        assert!(orchestrator.lifecycle().mark_running());
        let held = orchestrator.stopper().track().unwrap();

        let (_signals_tx, mut signals) = mpsc::channel(1);
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        let decision = orchestrator
            .drain_and_stop(ExitDecision::success(MSG_DRAINED), &mut signals)
            .await;
        release.await.unwrap();

        assert_eq!(decision, ExitDecision::success(MSG_DRAINED));
        assert_eq!(orchestrator.stopper().num_tasks(), 0);
    }
}
