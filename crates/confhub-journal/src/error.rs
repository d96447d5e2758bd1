//! Error types for confhub-journal

use thiserror::Error;

/// Journal error type
#[derive(Debug, Error)]
pub enum Error {
    /// No committed entry publishes this revision
    #[error("Revision not found: {0}")]
    RevisionNotFound(u64),

    /// Export error
    #[error("Export error: {0}")]
    ExportError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, Error>;
