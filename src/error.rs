//! Error taxonomy for the audit pipeline.
//!
//! Setup failures (launch, connect) are fatal to a run. Per-command protocol
//! failures are returned to the caller, who decides whether to retry or
//! abort. Gatherer and audit failures never surface here at all — they are
//! recorded as sentinel data so one broken collector cannot abort the run.

use thiserror::Error;

/// Errors from launching or supervising the browser process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The browser exited before its debugging endpoint became reachable.
    #[error("browser process exited before becoming ready (status {status})")]
    ProcessExited { status: i32 },

    /// The debugging endpoint never answered within the startup deadline.
    #[error("browser debugging endpoint not reachable after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    #[error("failed to spawn browser process: {0}")]
    Spawn(std::io::Error),
}

/// Errors from the remote debugging session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to connect to debugging endpoint {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("command {method} timed out after {timeout_ms}ms")]
    CommandTimeout { method: String, timeout_ms: u64 },

    /// The peer answered the command with an error object.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// A remotely evaluated script raised instead of returning a value.
    #[error("script evaluation raised: {0}")]
    ScriptException(String),

    #[error("connection closed while commands were in flight")]
    ConnectionClosed,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Errors from trace correlation.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A milestone required by the derived metric is absent from the trace.
    #[error("no `{kind}` event found in trace")]
    MissingMilestone { kind: &'static str },
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
