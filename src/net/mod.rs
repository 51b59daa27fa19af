//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (parse, bind, conflict detection)
//!     → axum server
//!     → connection.rs (admission gate + in-flight count per work category)
//!
//! Gate States:
//!     Accepting → Draining
//! ```
//!
//! # Design Decisions
//! - Work is counted from admission to completion so a drain can wait for it
//! - A closed gate answers new requests instead of queueing them

pub mod connection;
pub mod listener;

pub use connection::{GateState, WorkGuard, WorkId, WorkTracker};
pub use listener::{bind, ListenerError};
