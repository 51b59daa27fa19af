//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a replica node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Admin endpoint (drain, decommission, status).
    pub admin: AdminConfig,

    /// Local storage.
    pub store: StoreConfig,

    /// Shutdown timing.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Client bind address (e.g., "0.0.0.0:26257").
    pub client_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            client_address: "127.0.0.1:26257".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store directory. Ignored when `in_memory` is set.
    pub path: String,

    /// Keep nothing on disk except a scratch directory under the system temp dir.
    pub in_memory: bool,

    /// Interval of the internal heartbeat job.
    pub heartbeat_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "replica-data".to_string(),
            in_memory: false,
            heartbeat_interval_ms: 1000,
        }
    }
}

/// Shutdown timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time limit for a graceful drain-and-stop before a hard shutdown.
    pub grace_period_secs: u64,

    /// Interval of the "running tasks" progress log while draining.
    pub progress_interval_secs: u64,

    /// How long a stop before the node is running waits for confirmation.
    pub early_stop_wait_secs: u64,

    /// Time limit for in-flight work of one drain mode.
    pub drain_mode_timeout_secs: u64,

    /// Time limit for `replica-cli quit` before it falls back to a hard shutdown.
    pub quit_timeout_secs: u64,

    /// Print operator notices on stdout as well as in the log.
    pub echo_notices: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 60,
            progress_interval_secs: 5,
            early_stop_wait_secs: 5,
            drain_mode_timeout_secs: 25,
            quit_timeout_secs: 60,
            echo_notices: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
