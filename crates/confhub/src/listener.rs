//! Listener protocol and listener discovery
//!
//! A [`HubListener`] takes part in every commit of a hub:
//!
//! 1. `prepare` is called, in registration order, before anything is
//!    published. Any listener may veto the change by returning an error.
//! 2. If every listener prepared, the new snapshot is published and
//!    `commit` is called on each of them.
//! 3. Otherwise `rollback` is called on the listeners that had already
//!    prepared, in the order they prepared.
//!
//! The hub asks its [`ListenerRegistry`] for the listeners at the start of
//! every prepare, so listeners can come and go between transactions.

use crate::change::ChangeRecord;
use crate::error::ListenerError;
use crate::snapshot::Snapshot;
use crate::types::TypeSet;
use confhub_core::Value;
use parking_lot::RwLock;
use std::sync::Arc;

/// A change that has been proposed but not published
#[derive(Debug, Clone, Copy)]
pub struct ProposedChange<'a> {
    /// The snapshot that is current (and stays current on rollback)
    pub current: &'a Snapshot,
    /// The contents the transaction wants to publish
    pub proposed: &'a TypeSet,
    /// Commit message supplied by the writer
    pub message: Option<&'a Value>,
    /// The transaction's change log
    pub changes: &'a [ChangeRecord],
}

/// A change that has been published
#[derive(Debug, Clone, Copy)]
pub struct CommittedChange<'a> {
    /// The snapshot that was replaced
    pub old: &'a Snapshot,
    /// The snapshot that is now current
    pub new: &'a Snapshot,
    /// Commit message supplied by the writer
    pub message: Option<&'a Value>,
    /// The transaction's change log
    pub changes: &'a [ChangeRecord],
}

/// Participant in the hub's prepare/commit/rollback protocol
///
/// # Example
///
/// ```
/// use confhub::{HubListener, ListenerError, ProposedChange};
///
/// /// Refuses any transaction that would leave more than ten types
/// struct TypeLimit;
///
/// impl HubListener for TypeLimit {
///     fn prepare(&self, change: &ProposedChange<'_>) -> Result<(), ListenerError> {
///         if change.proposed.len() > 10 {
///             return Err("too many types".into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait HubListener: Send + Sync {
    /// Validate (and possibly stage) a proposed change
    fn prepare(&self, change: &ProposedChange<'_>) -> Result<(), ListenerError>;

    /// React to a published change
    ///
    /// Failures are reported to the committer but cannot undo publication.
    fn commit(&self, _change: &CommittedChange<'_>) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Undo whatever `prepare` staged
    fn rollback(&self, _change: &ProposedChange<'_>) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Name used to attribute errors and log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Source of the listeners taking part in a commit
pub trait ListenerRegistry: Send + Sync {
    /// All current listeners, in notification order
    fn list_all(&self) -> Vec<Arc<dyn HubListener>>;
}

/// Default registry: an ordered, mutable list of listeners
///
/// # Example
///
/// ```
/// use confhub::{Hub, HubListener, ListenerError, ListenerSet, ProposedChange};
/// use std::sync::Arc;
///
/// struct AcceptAll;
///
/// impl HubListener for AcceptAll {
///     fn prepare(&self, _: &ProposedChange<'_>) -> Result<(), ListenerError> {
///         Ok(())
///     }
/// }
///
/// let listeners = Arc::new(ListenerSet::new());
/// let hub = Hub::builder().listeners(listeners.clone()).build();
///
/// let accept: Arc<dyn HubListener> = Arc::new(AcceptAll);
/// listeners.register(accept.clone());
/// assert_eq!(listeners.len(), 1);
///
/// hub.new_transaction().commit(None).unwrap();
/// assert!(listeners.unregister(&accept));
/// ```
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn HubListener>>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; it is notified after every listener registered before it
    pub fn register(&self, listener: Arc<dyn HubListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener (matched by identity); returns whether it was present
    pub fn unregister(&self, listener: &Arc<dyn HubListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Remove all listeners
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl ListenerRegistry for ListenerSet {
    fn list_all(&self) -> Vec<Arc<dyn HubListener>> {
        self.listeners.read().clone()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        f.debug_list()
            .entries(listeners.iter().map(|l| l.name()))
            .finish()
    }
}
