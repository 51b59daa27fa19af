//! Replica node lifecycle controller library.

pub mod admin;
pub mod config;
pub mod drain;
pub mod lifecycle;
pub mod net;
pub mod node;
pub mod observability;

pub use config::NodeConfig;
pub use lifecycle::{ExitDecision, Lifecycle, Orchestrator, OrchestratorSettings, Stopper};
pub use node::{Node, ReplicaNode, StartError};
