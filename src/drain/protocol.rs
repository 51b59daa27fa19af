//! Drain request/response types and their NDJSON wire framing.
//!
//! Each response on the wire is one JSON object followed by `\n`:
//!
//! ```text
//! {"type":"progress","on":["clients"]}
//! {"type":"progress","on":["clients","internal"]}
//! {"type":"error","message":"..."}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Upper bound on a single encoded frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Category of work a drain stops admitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// Client-facing sessions and requests.
    Clients,
    /// Internal work such as replica leases and background jobs.
    Internal,
}

impl DrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainMode::Clients => "clients",
            DrainMode::Internal => "internal",
        }
    }
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modes drained, in order, by a graceful shutdown.
pub const GRACEFUL_DRAIN_MODES: [DrainMode; 2] = [DrainMode::Clients, DrainMode::Internal];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainRequest {
    /// Modes to drain, applied in order.
    #[serde(default)]
    pub modes: Vec<DrainMode>,
    /// Stop the node once the modes are drained.
    #[serde(default)]
    pub shutdown: bool,
}

impl DrainRequest {
    /// Liveness probe: changes nothing, answered with one empty response.
    pub fn probe() -> Self {
        Self::default()
    }

    pub fn graceful_shutdown() -> Self {
        Self::shutdown_after(GRACEFUL_DRAIN_MODES.to_vec())
    }

    pub fn shutdown_after(modes: Vec<DrainMode>) -> Self {
        Self { modes, shutdown: true }
    }

    /// Stop immediately without draining anything.
    pub fn hard_shutdown() -> Self {
        Self::shutdown_after(Vec::new())
    }

    pub fn is_probe(&self) -> bool {
        self.modes.is_empty() && !self.shutdown
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match (self.modes.is_empty(), self.shutdown) {
            (true, false) => "probe",
            (true, true) => "hard_shutdown",
            (false, true) => "drain_shutdown",
            (false, false) => "drain",
        }
    }
}

/// Progress acknowledgement: the modes drained so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainResponse {
    #[serde(default)]
    pub on: Vec<DrainMode>,
}

/// One line of the drain response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrainFrame {
    Progress {
        #[serde(default)]
        on: Vec<DrainMode>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("drain frame exceeds {MAX_FRAME_SIZE} bytes")]
    TooLarge,
    #[error("malformed drain frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("drain stream ended inside a frame")]
    Truncated,
}

/// Encode a frame as one NDJSON line.
pub fn encode_frame(frame: &DrainFrame) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(line)
}

/// Incremental NDJSON decoder. Chunks may split or join lines arbitrarily.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DrainFrame>, FrameError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = &line[..end];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            frames.push(serde_json::from_slice(line)?);
        }

        if self.buffer.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge);
        }
        Ok(frames)
    }

    /// Check that the stream did not stop in the middle of a line.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(FrameError::Truncated)
        }
    }
}
