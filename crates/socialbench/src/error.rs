//! Benchmark error types.

use thiserror::Error;

use crate::config::Phase;

/// Benchmark errors.
///
/// Every variant is fatal for a run; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid run configuration, detected before any connection is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend unreachable or credentials rejected.
    #[error("connection error: {0}")]
    Connection(String),

    /// Statement, pipeline or constraint failure reported by the driver.
    #[error("query error: {0}")]
    Query(String),

    /// A failure inside a workload phase, tagged with the entity or query it hit.
    #[error("{phase} {target} failed: {source}")]
    Phase {
        phase: Phase,
        target: String,
        source: Box<Error>,
    },

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap this error with the phase and target it occurred in.
    pub fn in_phase(self, phase: Phase, target: impl Into<String>) -> Self {
        Error::Phase {
            phase,
            target: target.into(),
            source: Box::new(self),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Error::Connection(err.to_string()),
            other => Error::Query(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Query(err.to_string())
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::Query(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
