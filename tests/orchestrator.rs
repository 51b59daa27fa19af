//! Signal handling and shutdown escalation, driven through stub nodes.

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::StreamExt;

use replica_node::drain::{DrainMode, DrainRequest};
use replica_node::lifecycle::exit::{
    EXIT_INTERRUPTED, EXIT_SHUTDOWN_TIMEOUT, EXIT_STARTUP_FAILED, EXIT_SUCCESS, HARD_SHUTDOWN_HINT, MSG_DRAINED,
    MSG_STOPPED_REMOTELY, MSG_TOO_EARLY,
};
use replica_node::lifecycle::{Phase, Signal};
use replica_node::StartError;

mod common;
use common::{fast_settings, Harness, StubDrainer, StubNode, CLIENT_ADDRESS};

#[tokio::test]
async fn terminate_while_running_drains_and_succeeds() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::TERMINATE).await;
    let drainer = harness.drainer.clone();
    let stopper = harness.stopper.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_SUCCESS);
    assert_eq!(decision.cause, MSG_DRAINED);
    assert_eq!(drainer.calls(), vec![DrainMode::Clients, DrainMode::Internal]);
    assert_eq!(stopper.num_tasks(), 0);
}

#[tokio::test]
async fn interrupt_while_running_drains_and_reports_interrupt() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::INTERRUPT).await;
    let drainer = harness.drainer.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_INTERRUPTED);
    assert_eq!(decision.cause, "interrupted");
    assert_eq!(drainer.calls(), vec![DrainMode::Clients, DrainMode::Internal]);
}

#[tokio::test]
async fn quit_signal_is_handled_like_terminate() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::QUIT).await;
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_SUCCESS);
    assert_eq!(decision.cause, MSG_DRAINED);
}

#[tokio::test]
async fn second_signal_forces_exit_without_second_drain() {
    let harness = Harness::start(StubNode::default(), StubDrainer::hanging(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::TERMINATE).await;
    harness.wait_for_phase(Phase::Draining).await;
    harness.send(Signal::INTERRUPT).await;

    let drainer = harness.drainer.clone();
    let lifecycle = harness.lifecycle.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, 130);
    assert!(decision.cause.starts_with("received signal 'interrupt' during shutdown"));
    assert!(decision.cause.ends_with(HARD_SHUTDOWN_HINT));
    assert_eq!(drainer.calls(), vec![DrainMode::Clients]);
    assert!(lifecycle.snapshot().drain_issued);
}

#[tokio::test]
async fn stuck_drain_hits_time_limit() {
    let mut settings = fast_settings();
    settings.grace_period = Duration::from_millis(200);
    let harness = Harness::start(StubNode::default(), StubDrainer::hanging(), settings);
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::TERMINATE).await;
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_SHUTDOWN_TIMEOUT);
    assert!(decision.cause.starts_with("time limit reached, initiating hard shutdown"));
}

#[tokio::test]
async fn failed_drain_still_stops_the_node() {
    let harness = Harness::start(
        StubNode::default(),
        StubDrainer::failing_on(DrainMode::Clients),
        fast_settings(),
    );
    harness.wait_for_phase(Phase::Running).await;

    harness.send(Signal::TERMINATE).await;
    let drainer = harness.drainer.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_SUCCESS);
    assert_eq!(drainer.calls(), vec![DrainMode::Clients]);
}

#[tokio::test]
async fn signal_during_init_stops_without_draining() {
    let (node, release_init) = StubNode::gated();
    let served = node.served.clone();
    let harness = Harness::start(node, StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Starting).await;

    harness.send(Signal::TERMINATE).await;
    let drainer = harness.drainer.clone();
    let lifecycle = harness.lifecycle.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_SUCCESS);
    assert_eq!(decision.cause, MSG_TOO_EARLY);
    assert!(drainer.calls().is_empty());
    assert!(!lifecycle.snapshot().drain_issued);

    // Initialization finishing late must not bring the node up.
    release_init.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!served.load(Ordering::SeqCst));
    assert_eq!(lifecycle.phase(), Phase::Stopped);
}

#[tokio::test]
async fn interrupt_during_init_reports_interrupt() {
    let (node, _release_init) = StubNode::gated();
    let harness = Harness::start(node, StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Starting).await;

    harness.send(Signal::INTERRUPT).await;
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_INTERRUPTED);
    assert_eq!(decision.cause, "interrupted");
}

#[tokio::test]
async fn init_failure_is_fatal() {
    let node = StubNode {
        init_error: Some(StartError::Init("disk full".into())),
        ..Default::default()
    };
    let served = node.served.clone();
    let harness = Harness::start(node, StubDrainer::default(), fast_settings());

    let drainer = harness.drainer.clone();
    let lifecycle = harness.lifecycle.clone();
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_STARTUP_FAILED);
    assert!(decision.cause.contains("failed to initialize node: disk full"));
    assert!(drainer.calls().is_empty());
    assert!(!served.load(Ordering::SeqCst));
    assert_eq!(lifecycle.phase(), Phase::Failed);
}

#[tokio::test]
async fn listen_conflict_names_the_option() {
    let node = StubNode {
        serve_error: Some(StartError::ListenConflict {
            address: CLIENT_ADDRESS.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        }),
        ..Default::default()
    };
    let harness = Harness::start(node, StubDrainer::default(), fast_settings());
    let decision = harness.decision().await;

    assert_eq!(decision.exit_code, EXIT_STARTUP_FAILED);
    assert!(decision.cause.contains(CLIENT_ADDRESS));
    assert!(decision.cause.contains("consider changing the port via `listener.client_address`"));
}

#[tokio::test]
async fn remote_shutdown_exits_cleanly() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    let progress: Vec<_> = harness
        .drain
        .handle_drain(DrainRequest::graceful_shutdown())
        .collect()
        .await;
    assert_eq!(progress.len(), 2);

    let decision = harness.decision().await;
    assert_eq!(decision.exit_code, EXIT_SUCCESS);
    assert_eq!(decision.cause, MSG_STOPPED_REMOTELY);
}

#[tokio::test]
async fn probe_does_not_disturb_running_node() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    let progress: Vec<_> = harness.drain.handle_drain(DrainRequest::probe()).collect().await;
    assert_eq!(progress.len(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.lifecycle.phase(), Phase::Running);
    assert!(!harness.stopper.is_stopping());

    harness.send(Signal::TERMINATE).await;
    assert_eq!(harness.decision().await.cause, MSG_DRAINED);
}

#[tokio::test]
async fn signal_after_remote_stop_forces_exit() {
    let harness = Harness::start(StubNode::default(), StubDrainer::default(), fast_settings());
    harness.wait_for_phase(Phase::Running).await;

    // Hold the stub server open so the stop cannot complete on its own.
    let hold = harness.stopper.track().unwrap();
    harness.stopper.request_stop();
    harness.wait_for_phase(Phase::Draining).await;

    harness.send(Signal::TERMINATE).await;
    let decision = harness.decision().await;
    drop(hold);

    assert_eq!(decision.exit_code, 143);
    assert!(decision.cause.contains("'terminated'"));
}
