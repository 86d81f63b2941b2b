//! Error types for the evaluation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagBenchError>;

/// Errors that can occur in the evaluation pipeline.
#[derive(Error, Debug)]
pub enum RagBenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// CSV parse or write error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// No documents found in the corpus directory.
    #[error("No documents found in corpus at '{0}'")]
    EmptyCorpus(PathBuf),

    /// Network-level failure talking to a remote service.
    #[error("{service} transport error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// A remote service answered with a non-success HTTP status.
    #[error("{service} API returned {status}: {detail}")]
    Api {
        service: &'static str,
        status: u16,
        detail: String,
    },

    /// A remote service answered 2xx but the body was not usable.
    #[error("malformed {service} response: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    /// One embedding batch exhausted its retry budget. The whole embed
    /// call fails; a short vector sequence is never returned.
    #[error("embedding batch {batch} ({texts} texts) failed after {attempts} attempts: {last}")]
    EmbeddingBatchFailed {
        batch: usize,
        texts: usize,
        attempts: u32,
        last: String,
    },

    /// The embedding service changed vector dimensionality mid-run.
    #[error("embedding dimension changed mid-run: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A vector index operation failed.
    #[error("vector index {operation} failed for collection '{collection}': {message}")]
    Index {
        operation: &'static str,
        collection: String,
        message: String,
    },
}

impl RagBenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a transport error for the named service.
    pub fn transport(service: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            message: message.into(),
        }
    }

    /// Create an index error for the named operation and collection.
    pub fn index(
        operation: &'static str,
        collection: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Index {
            operation,
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the failed remote call could succeed.
    ///
    /// Transport failures and 429/5xx statuses are retryable; everything
    /// else (bad request, bad config, malformed data) fails fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagBenchError::Transport { .. } => true,
            RagBenchError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<csv::Error> for RagBenchError {
    fn from(err: csv::Error) -> Self {
        RagBenchError::Csv(err.to_string())
    }
}
