//! Error types for confhub
//!
//! Listener callbacks report failures as a boxed [`ListenerError`]. When more
//! than one thing goes wrong during a single commit attempt (a prepare failure
//! followed by failing rollbacks, or several failing commit callbacks) the
//! individual errors are collected into a [`MultiError`] that keeps every cause
//! in the order it happened.

use std::fmt;
use thiserror::Error;

/// Result type for confhub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by listener callbacks and two-phase resources
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Protocol misuse detected by a hub or transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// The transaction has already been committed (or a commit was attempted)
    #[error("transaction has already been committed")]
    AlreadyCommitted,

    /// Another transaction is between prepare and activate/rollback
    #[error("another transaction is already in progress on this hub")]
    TransactionInProgress,

    /// Activate (or a second activate/rollback) without a successful prepare
    #[error("transaction has not been successfully prepared")]
    NotPrepared,
}

/// Errors that can occur in confhub
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol misuse
    #[error("invalid state: {0}")]
    State(#[from] StateError),

    /// The transaction was based on a revision that is no longer current
    #[error("concurrent modification: transaction based on revision {base}, current revision is {current}")]
    ConcurrentModification {
        /// Revision the transaction was opened against
        base: u64,
        /// Revision current at the time of the check
        current: u64,
    },

    /// Absent or invalid key, bean, or type name
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A listener rejected the change during prepare
    #[error("listener {listener} failed to prepare: {source}")]
    PrepareFailed {
        listener: String,
        #[source]
        source: ListenerError,
    },

    /// A listener failed while a failed prepare was being unwound
    #[error("listener {listener} failed to roll back: {source}")]
    RollbackFailed {
        listener: String,
        #[source]
        source: ListenerError,
    },

    /// A listener failed after the new snapshot was published
    #[error("listener {listener} failed to commit: {source}")]
    CommitFailed {
        listener: String,
        #[source]
        source: ListenerError,
    },

    /// A non-hub participant of a two-phase commit failed
    #[error("resource {resource} failed: {source}")]
    ResourceFailed {
        resource: String,
        #[source]
        source: ListenerError,
    },

    /// The commit attempt was abandoned; nothing was published
    ///
    /// The first cause is the failure that triggered the abort, followed by
    /// any failures raised while rolling back.
    #[error("transaction aborted: {0}")]
    Aborted(MultiError),

    /// The snapshot was published but some commit callbacks failed
    ///
    /// Publication is final: callers must treat this as a partial success.
    #[error("revision {revision} published, but {failures}")]
    PartiallyCommitted {
        /// Revision of the snapshot that is now current
        revision: u64,
        /// Commit callback failures, in listener order
        failures: MultiError,
    },

    /// Every participant of a two-phase commit prepared, but some failed to activate
    #[error("activation incomplete: {0}")]
    ActivationFailed(MultiError),

    /// The reflection helper could not diff the beans
    #[error("diff error: {0}")]
    Diff(#[from] confhub_core::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// The state error, if this is one
    pub fn state_error(&self) -> Option<StateError> {
        match self {
            Error::State(e) => Some(*e),
            _ => None,
        }
    }

    /// Whether this is a stale-base failure
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Error::ConcurrentModification { .. })
    }

    /// The aggregated causes of an aborted or partially committed transaction
    pub fn causes(&self) -> Option<&MultiError> {
        match self {
            Error::Aborted(multi) => Some(multi),
            Error::PartiallyCommitted { failures, .. } => Some(failures),
            Error::ActivationFailed(multi) => Some(multi),
            _ => None,
        }
    }
}

/// An ordered collection of errors raised during one operation
///
/// # Example
///
/// ```
/// use confhub::{Error, MultiError};
///
/// let mut errors = MultiError::new();
/// errors.push(Error::invalid_argument("first"));
/// errors.push(Error::invalid_argument("second"));
///
/// assert_eq!(errors.len(), 2);
/// assert!(errors.first().unwrap().to_string().contains("first"));
/// ```
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// The first error, if any
    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }

    /// All errors in the order they were recorded
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Consume the collection, yielding the errors
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// Number of errors collected
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True if no error was collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<Vec<Error>> for MultiError {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "1 error: {}", self.errors[0]),
            n => {
                write!(f, "{} errors: ", n)?;
                for (i, error) in self.errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
// This function is never called but will fail to compile if the bound is not satisfied.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
    _assert_error_send_sync::<MultiError>();
}
