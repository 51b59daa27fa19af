//! Drain protocol subsystem.
//!
//! # Data Flow
//! ```text
//! replica-cli quit
//!     → client.rs (probe, drain + shutdown, hard-shutdown fallback)
//!     → transport.rs (POST /admin/drain, NDJSON decode)
//!     → admin endpoint
//!     → server.rs (apply modes in order, stream acks, stop node)
//!     → Drainer (node work gates)
//!
//! The orchestrator calls server.rs directly when a signal begins a drain.
//! ```
//!
//! # Design Decisions
//! - A request with no modes and no shutdown is a probe and changes nothing
//! - A request with no modes and shutdown set is a hard shutdown
//! - A node closing the connection after a shutdown request is success

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{request_shutdown, QuitError, QuitOptions, QuitOutcome};
pub use protocol::{DrainMode, DrainRequest, DrainResponse, GRACEFUL_DRAIN_MODES};
pub use server::{DrainError, DrainService, Drainer};
pub use transport::{DrainTransport, HttpTransport, TransportError};
