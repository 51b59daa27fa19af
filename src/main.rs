//! Replica node.
//!
//! Starts one node of the data store and supervises it until the process exits.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT / SIGTERM / SIGQUIT                         replica-cli quit
//!            │                                                │
//!            ▼                                                ▼
//!   ┌─────────────────┐   drain (in process)     ┌─────────────────────┐
//!   │  orchestrator   │─────────────────────────▶│  drain service      │◀── POST /admin/drain
//!   │  + escalation   │                          │  (modes in order)   │
//!   └───────┬─────────┘                          └─────────┬───────────┘
//!           │ start                                        │ close gates, wait
//!           ▼                                              ▼
//!   ┌─────────────────┐  spawn on stopper        ┌─────────────────────┐
//!   │  startup task   │─────────────────────────▶│ client server       │
//!   │  init → serve   │                          │ admin server        │
//!   └─────────────────┘                          │ heartbeat, store    │
//!                                                └─────────────────────┘
//! ```
//!
//! # Exit Codes
//! - 0: drained and stopped (terminate, or stop through the drain endpoint)
//! - 1: drained and stopped after an interrupt
//! - 2: startup failed
//! - 3: graceful shutdown exceeded its time limit
//! - 128+N: second signal N during shutdown

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use replica_node::config::{load_config, NodeConfig};
use replica_node::lifecycle::exit::EXIT_STARTUP_FAILED;
use replica_node::lifecycle::signals;
use replica_node::observability::{logging, metrics};
use replica_node::{Lifecycle, Orchestrator, OrchestratorSettings, ReplicaNode, Stopper};

#[derive(Parser)]
#[command(name = "replica-node", version, about = "Start a replica node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                std::process::exit(EXIT_STARTUP_FAILED);
            }
        },
        None => NodeConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "replica-node starting");

    // Registered before anything starts so no signal during init is lost.
    let signals = match signals::install() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("Error: failed to install signal handlers: {}", e);
            std::process::exit(EXIT_STARTUP_FAILED);
        }
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        client_address = %config.listener.client_address,
        admin_address = %config.admin.bind_address,
        grace_period_secs = config.shutdown.grace_period_secs,
        "Configuration loaded"
    );

    let lifecycle = Lifecycle::new();
    let stopper = Stopper::new();
    let (node, drain) = ReplicaNode::new(config.clone(), lifecycle.clone(), stopper.clone());
    let orchestrator = Orchestrator::new(OrchestratorSettings::from(&config), lifecycle, stopper, drain);

    let decision = orchestrator.run(node, signals).await;
    if decision.user_facing {
        eprintln!("ERROR: {}", decision.cause);
    }
    std::process::exit(decision.exit_code);
}
