//! The node being run.
//!
//! # Data Flow
//! ```text
//! init()  (store.rs)
//!     → create store dir → clean abandoned temp dirs → create + record temp dir
//!
//! serve() (replica.rs)
//!     → bind client listener → bind admin listener
//!     → spawn on Stopper: client server, admin server, heartbeat, store keeper
//!     → startup summary
//!
//! drain   (work.rs)
//!     clients  → close client gate  → wait for in-flight requests
//!     internal → close internal gate → wait for heartbeat work
//! ```
//!
//! # Design Decisions
//! - The lifecycle only sees the [`Node`] trait: init, then serve
//! - Everything `serve` starts is registered with the Stopper, so "stopped"
//!   means every listener and job has exited

use std::future::Future;

use thiserror::Error;

use crate::lifecycle::shutdown::Stopper;

pub mod membership;
pub mod replica;
pub mod store;
pub mod work;

pub use membership::{Membership, MembershipError, MembershipStatus};
pub use replica::ReplicaNode;
pub use store::{StoreError, StoreHandle};
pub use work::NodeWork;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to initialize node: {0}")]
    Init(#[source] BoxError),
    #[error("could not listen on {address}: {source}")]
    ListenConflict {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("node server exited with error: {0}")]
    Serve(#[source] BoxError),
}

/// A node the lifecycle controller can start.
pub trait Node: Send + 'static {
    /// Acquire storage and everything else needed before listeners come up.
    fn init(&mut self) -> impl Future<Output = Result<(), StartError>> + Send;

    /// Bind listeners and spawn serving tasks on `stopper`.
    ///
    /// Returns once the listeners are bound; serving continues in the
    /// spawned tasks until the stopper asks them to stop.
    fn serve(&mut self, stopper: Stopper) -> impl Future<Output = Result<(), StartError>> + Send;
}
