//! TCP listener binding.
//!
//! # Responsibilities
//! - Parse and bind configured addresses
//! - Report address conflicts distinctly so startup can name the option to change

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address {address}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    /// The address is already taken by another process.
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, ListenerError::Bind { source, .. } if source.kind() == std::io::ErrorKind::AddrInUse)
    }
}

/// Bind a TCP listener on `address`.
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address.parse().map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })?;

    let listener = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;

    let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
