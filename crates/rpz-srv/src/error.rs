//! Error types for the rpz-srv policy zone engine.

use rpz_core::CoreError;
use thiserror::Error;

/// Errors that can occur in rpz-srv operations.
#[derive(Error, Debug)]
pub enum SrvError {
    /// DNS server failed to bind or start.
    #[error("dns server error: {0}")]
    Server(String),

    /// Failed to build or update the output zone.
    #[error("zone error: {0}")]
    Zone(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// Serial state file read/write failed.
    #[error("state error: {0}")]
    State(String),

    /// A source list is unknown, duplicated, or cannot be changed.
    #[error("source error: {0}")]
    Source(String),

    /// Loading a source list from disk failed.
    #[error("failed to load {path}: {reason}")]
    SourceFile { path: String, reason: String },

    /// Upstream SOA query or zone transfer failed.
    #[error("zone transfer failed: {0}")]
    Transfer(String),

    /// Upstream did not answer within the configured timeout.
    #[error("upstream {0} timed out")]
    Timeout(String),

    /// Intel-feed batch was rejected before any change was made.
    #[error("rejected feed batch: {0}")]
    Feed(String),

    /// Control-plane command could not be carried out.
    #[error("command failed: {0}")]
    Command(String),

    /// The coordinator task is gone.
    #[error("coordinator stopped")]
    CoordinatorStopped,

    /// Malformed action, tag, list type or command.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// DNS wire encoding/decoding failed.
    #[error("dns protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
