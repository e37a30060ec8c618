//! Error types. Line-level and per-ip failures are contained where they occur;
//! only [`EtlError`] ever reaches the run driver.

use thiserror::Error;

/// Why a single log line was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("malformed line: {0}")]
    MalformedLine(String),

    #[error("unparseable timestamp: {0}")]
    UnparseableTimestamp(String),
}

/// Failure of one external geolocation call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Backend asked us to slow down; the caller may retry.
    #[error("rate limited")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors surfaced by collaborators and the run driver.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source error: {0}")]
    Source(String),

    #[error("cache load failed: {0}")]
    CacheLoad(String),

    #[error("cache persist failed: {0}")]
    CachePersist(String),

    #[error("sink error: {0}")]
    Sink(String),

    /// No input sources at all; the run stops before producing output.
    #[error("no input sources: {0}")]
    NoInput(String),

    #[error("run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EtlError>;
