//! WritableDatabase - a transaction's private working copy
//!
//! A transaction is opened against the hub's current snapshot. Its types are
//! writable copies that share instance maps with the snapshot until they are
//! first written to. All mutations append to one ordered change log; the log
//! also carries the `committed` flag, so a transaction can be committed at
//! most once and never mutated afterwards.
//!
//! # Locking
//!
//! Locks are always taken in the order: type index, writable type, change
//! log. None of them is held while the hub runs listener callbacks.

use crate::change::ChangeRecord;
use crate::error::{Error, Result, StateError};
use crate::hub::Hub;
use crate::snapshot::Snapshot;
use crate::two_phase::TransactionResource;
use crate::types::{Type, TypeSet};
use crate::writable_type::WritableType;
use confhub_core::Value;
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Ordered change log plus the committed flag
#[derive(Debug, Default)]
pub(crate) struct TxnLog {
    state: Mutex<LogState>,
}

#[derive(Debug, Default)]
pub(crate) struct LogState {
    changes: Vec<ChangeRecord>,
    committed: bool,
}

impl LogState {
    pub(crate) fn push(&mut self, change: ChangeRecord) {
        self.changes.push(change);
    }
}

impl TxnLog {
    /// Lock the log for appending; fails once the transaction is committed
    pub(crate) fn open(&self) -> Result<MutexGuard<'_, LogState>> {
        let state = self.state.lock();
        if state.committed {
            return Err(StateError::AlreadyCommitted.into());
        }
        Ok(state)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.open().map(drop)
    }

    /// Flip the committed flag and hand out the final change list
    fn seal(&self) -> Result<Vec<ChangeRecord>> {
        let mut state = self.open()?;
        state.committed = true;
        Ok(state.changes.clone())
    }

    fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    fn changes(&self) -> Vec<ChangeRecord> {
        self.state.lock().changes.clone()
    }
}

struct TxnInner {
    hub: Hub,
    base: Arc<Snapshot>,
    types: Mutex<IndexMap<String, Arc<WritableType>>>,
    log: Arc<TxnLog>,
    removed: Mutex<Vec<Arc<WritableType>>>,
    message: Mutex<Option<Value>>,
}

/// A mutable working copy of a snapshot, not yet published
///
/// Cloning yields another handle to the same transaction.
///
/// # Example
///
/// ```
/// use confhub::Hub;
/// use confhub_core::Value;
///
/// let hub = Hub::new();
/// let txn = hub.new_transaction();
///
/// let widgets = txn.find_or_add_type("Widget").unwrap();
/// widgets.add_instance("w1", Value::bean([("color", "red")]), None).unwrap();
///
/// let published = txn.commit(None).unwrap();
/// assert!(published.revision() > txn.base_revision());
/// assert!(txn.is_committed());
/// ```
#[derive(Clone)]
pub struct WritableDatabase {
    inner: Arc<TxnInner>,
}

impl WritableDatabase {
    pub(crate) fn new(hub: Hub, base: Arc<Snapshot>) -> Self {
        let log = Arc::new(TxnLog::default());
        let types = base
            .types()
            .iter()
            .map(|ty| {
                let writable = WritableType::from_type(ty, Arc::clone(&log));
                (ty.name().to_string(), Arc::new(writable))
            })
            .collect();

        Self {
            inner: Arc::new(TxnInner {
                hub,
                base,
                types: Mutex::new(types),
                log,
                removed: Mutex::new(Vec::new()),
                message: Mutex::new(None),
            }),
        }
    }

    /// Revision of the snapshot this transaction was opened against
    pub fn base_revision(&self) -> u64 {
        self.inner.base.revision()
    }

    /// The snapshot this transaction was opened against
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.inner.base
    }

    /// Get a type, creating it (and recording `ADD_TYPE`) if absent
    pub fn find_or_add_type(&self, name: &str) -> Result<Arc<WritableType>> {
        if name.is_empty() {
            return Err(Error::invalid_argument("type name must not be empty"));
        }

        let mut types = self.inner.types.lock();
        if let Some(existing) = types.get(name) {
            return Ok(Arc::clone(existing));
        }

        let mut log = self.inner.log.open()?;
        let helper = self.inner.hub.helper_factory().create(name);
        let writable = Arc::new(WritableType::new(
            name,
            helper,
            Arc::clone(&self.inner.log),
        ));
        types.insert(name.to_string(), Arc::clone(&writable));
        log.push(ChangeRecord::add_type(name));

        Ok(writable)
    }

    /// Remove a type and all of its instances
    ///
    /// Records one `REMOVE_INSTANCE` per instance, then `REMOVE_TYPE`.
    /// Returns a read-only view of the type as it was before removal, or
    /// `None` if there was no such type. The removed type's reflection helper
    /// is disposed once the transaction's outcome is final.
    pub fn remove_type(&self, name: &str) -> Result<Option<Arc<Type>>> {
        if name.is_empty() {
            return Err(Error::invalid_argument("type name must not be empty"));
        }

        let mut types = self.inner.types.lock();
        let Some(writable) = types.get(name).cloned() else {
            self.inner.log.ensure_open()?;
            return Ok(None);
        };

        let view = writable.remove_all()?;
        types.shift_remove(name);
        self.inner.removed.lock().push(writable);

        Ok(Some(view))
    }

    /// Get a type of this transaction
    pub fn get_type(&self, name: &str) -> Option<Arc<WritableType>> {
        self.inner.types.lock().get(name).cloned()
    }

    /// Names of all types, in order
    pub fn type_names(&self) -> Vec<String> {
        self.inner.types.lock().keys().cloned().collect()
    }

    /// A copy of the change log so far
    pub fn changes(&self) -> Vec<ChangeRecord> {
        self.inner.log.changes()
    }

    /// Whether a commit has been attempted on this transaction
    pub fn is_committed(&self) -> bool {
        self.inner.log.is_committed()
    }

    /// Message passed to listeners when [`commit`](Self::commit) is called without one
    pub fn set_commit_message(&self, message: Option<Value>) {
        *self.inner.message.lock() = message;
    }

    /// The message set with [`set_commit_message`](Self::set_commit_message)
    pub fn commit_message(&self) -> Option<Value> {
        self.inner.message.lock().clone()
    }

    /// Prepare and activate this transaction on its hub
    ///
    /// Returns the newly published snapshot. Fails with
    /// [`StateError::AlreadyCommitted`] on a second attempt, whatever the
    /// outcome of the first. Without an explicit `message` the stored one
    /// is used.
    pub fn commit(&self, message: Option<Value>) -> Result<Arc<Snapshot>> {
        self.inner.hub.commit(self, message)
    }

    /// Expose this transaction as one participant of a two-phase commit
    pub fn as_two_phase_resource(&self, message: Option<Value>) -> TransactionResource {
        let message = message.or_else(|| self.commit_message());
        TransactionResource::new(self.clone(), message)
    }

    pub(crate) fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    /// Flip the committed flag; the returned log is what gets published
    pub(crate) fn seal(&self) -> Result<Vec<ChangeRecord>> {
        self.inner.log.seal()
    }

    /// Read-only type index of the current contents
    pub(crate) fn freeze(&self) -> TypeSet {
        let types = self.inner.types.lock();
        TypeSet::from_map(
            types
                .iter()
                .map(|(name, writable)| (name.clone(), writable.freeze()))
                .collect(),
        )
    }

    /// Dispose helpers of removed types that `live` no longer uses
    ///
    /// Runs once; later calls find nothing left to dispose.
    pub(crate) fn dispose_removed(&self, live: &Snapshot) -> usize {
        let removed = std::mem::take(&mut *self.inner.removed.lock());
        let mut disposed = 0;
        for writable in removed {
            let still_live = live
                .get_type(writable.name())
                .is_some_and(|ty| Arc::ptr_eq(ty.helper(), writable.helper()));
            if !still_live {
                writable.helper().dispose();
                disposed += 1;
            }
        }
        disposed
    }
}

impl fmt::Debug for WritableDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableDatabase")
            .field("base_revision", &self.base_revision())
            .field("types", &self.type_names())
            .field("changes", &self.inner.log.state.lock().changes.len())
            .field("committed", &self.is_committed())
            .finish()
    }
}
