//! Shared stubs and helpers for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use replica_node::drain::{DrainError, DrainMode, DrainService, Drainer};
use replica_node::lifecycle::startup::ListenHints;
use replica_node::lifecycle::{Phase, Signal};
use replica_node::{ExitDecision, Lifecycle, Node, Orchestrator, OrchestratorSettings, StartError, Stopper};

pub const CLIENT_ADDRESS: &str = "127.0.0.1:26257";
pub const ADMIN_ADDRESS: &str = "127.0.0.1:8081";

/// Settings with short timings for tests.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        grace_period: Duration::from_secs(3),
        progress_interval: Duration::from_millis(50),
        early_stop_wait: Duration::from_millis(500),
        echo_notices: false,
        listen_hints: ListenHints {
            client_address: CLIENT_ADDRESS.to_string(),
            admin_address: ADMIN_ADDRESS.to_string(),
        },
    }
}

/// A node whose startup is scripted by the test.
#[derive(Default)]
pub struct StubNode {
    /// `init` waits for this gate when set.
    pub init_gate: Option<oneshot::Receiver<()>>,
    pub init_error: Option<StartError>,
    pub serve_error: Option<StartError>,
    pub served: Arc<AtomicBool>,
}

impl StubNode {
    /// A node whose `init` blocks until the returned sender fires or is dropped.
    pub fn gated() -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let node = StubNode {
            init_gate: Some(rx),
            ..Default::default()
        };
        (node, tx)
    }
}

impl Node for StubNode {
    async fn init(&mut self) -> Result<(), StartError> {
        if let Some(gate) = self.init_gate.take() {
            let _ = gate.await;
        }
        match self.init_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn serve(&mut self, stopper: Stopper) -> Result<(), StartError> {
        self.served.store(true, Ordering::SeqCst);
        if let Some(e) = self.serve_error.take() {
            return Err(e);
        }
        let watcher = stopper.clone();
        stopper.spawn("stub-server", async move { watcher.should_stop().await });
        Ok(())
    }
}

/// A drainer that records the modes it is asked to drain.
#[derive(Default)]
pub struct StubDrainer {
    calls: Mutex<Vec<DrainMode>>,
    /// Never finish draining.
    pub hang: bool,
    pub fail_on: Option<DrainMode>,
}

impl StubDrainer {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn failing_on(mode: DrainMode) -> Self {
        Self {
            fail_on: Some(mode),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<DrainMode> {
        self.calls.lock().unwrap().clone()
    }
}

impl Drainer for StubDrainer {
    fn drain(&self, mode: DrainMode) -> BoxFuture<'_, Result<(), DrainError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(mode);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail_on == Some(mode) {
                return Err(DrainError::Failed {
                    mode,
                    reason: "injected".to_string(),
                });
            }
            Ok(())
        })
    }
}

/// An orchestrator running a stub node in the background.
pub struct Harness {
    pub lifecycle: Lifecycle,
    pub stopper: Stopper,
    pub drain: DrainService,
    pub drainer: Arc<StubDrainer>,
    pub signals: mpsc::Sender<Signal>,
    handle: JoinHandle<ExitDecision>,
}

impl Harness {
    pub fn start(node: StubNode, drainer: StubDrainer, settings: OrchestratorSettings) -> Self {
        let lifecycle = Lifecycle::new();
        let stopper = Stopper::new();
        let drainer = Arc::new(drainer);
        let drain = DrainService::new(drainer.clone(), stopper.clone(), lifecycle.clone());
        let (signals, rx) = mpsc::channel(8);

        let orchestrator = Orchestrator::new(settings, lifecycle.clone(), stopper.clone(), drain.clone());
        let handle = tokio::spawn(orchestrator.run(node, rx));

        Self {
            lifecycle,
            stopper,
            drain,
            drainer,
            signals,
            handle,
        }
    }

    pub async fn send(&self, signal: Signal) {
        self.signals.send(signal).await.unwrap();
    }

    pub async fn wait_for_phase(&self, phase: Phase) {
        wait_for_phase(&self.lifecycle, phase).await;
    }

    pub async fn decision(self) -> ExitDecision {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("orchestrator should exit")
            .unwrap()
    }
}

pub async fn wait_for_phase(lifecycle: &Lifecycle, phase: Phase) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while lifecycle.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "node never reached {phase}, stuck in {}", lifecycle.phase());
}

/// Reserve a free local port. The port is released before returning.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
