//! Typed errors for the streaming client and the progress display.
//!
//! Filesystem-bound modules (packs, archives, storage, config) use
//! `anyhow` with context instead; these two types exist because callers
//! branch on them.

use thiserror::Error;

use crate::progress::Anomaly;

/// Boxed transport-level cause, so connectors other than gRPC can report
/// their own failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::rpc::Client`] operations.
///
/// Every variant raised mid-session carries the name of the operation
/// (`up_build`, `up_stream`, `get_version`) it interrupted.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to dial {addr:?}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: BoxError,
    },

    #[error("rpc error handling {op}: {source}")]
    Rpc {
        op: &'static str,
        #[source]
        source: tonic::Status,
    },

    #[error("rpc error handling {op} send: outbound stream closed by the transport")]
    Send { op: &'static str },

    #[error("rpc error handling {op} recv: {source}")]
    Receive {
        op: &'static str,
        #[source]
        source: tonic::Status,
    },

    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    #[error("{op} task failed: {source}")]
    Task {
        op: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ClientError {
    /// True when the session ended because its cancellation token fired,
    /// as opposed to a transport or server failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled { .. })
    }

    /// Name of the operation the error interrupted, if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            ClientError::Rpc { op, .. }
            | ClientError::Send { op }
            | ClientError::Receive { op, .. }
            | ClientError::Cancelled { op }
            | ClientError::Task { op, .. } => Some(op),
            ClientError::InvalidAddress { .. } | ClientError::Connect { .. } => None,
        }
    }
}

/// Errors surfaced by [`crate::progress::ProgressDisplay::render`].
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to write progress output: {0}")]
    Output(#[from] std::io::Error),

    #[error("protocol anomaly: {0}")]
    Anomaly(Anomaly),

    #[error("stage renderer failed: {0}")]
    Stage(#[from] tokio::task::JoinError),
}
