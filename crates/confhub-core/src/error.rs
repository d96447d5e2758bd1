//! Error types for confhub-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Not a bean: expected a map value, got {found}")]
    NotABean { found: &'static str },

    #[error("Reflection helper for type {type_name:?} has been disposed")]
    HelperDisposed { type_name: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
