//! Error types for the incident store.

use thiserror::Error;

/// Errors raised by the embedding step.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP request to the embedding endpoint failed
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("embedding endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Endpoint answered without a usable vector
    #[error("embedding response contained no vector")]
    Empty,
}

/// Errors raised by [`crate::IncidentStore`] operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Caller supplied an unusable argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An insert, delete or reset could not be completed
    #[error("failed to write incident store: {0}")]
    Write(String),

    /// A similarity search could not be completed
    #[error("failed to query incident store: {0}")]
    Query(String),

    /// Filesystem access to the collection failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Collection file exists but cannot be parsed
    #[error("collection file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    /// Collection vectors come from a different embedding model
    #[error(
        "collection '{collection}' was built with embedding model '{stored}', \
         but '{configured}' is configured"
    )]
    ModelMismatch {
        collection: String,
        stored: String,
        configured: String,
    },
}

/// Result alias for store operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
