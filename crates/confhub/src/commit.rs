//! The prepare / activate / rollback protocol
//!
//! Publishing a transaction is split into three steps so that it can be one
//! participant of a larger two-phase commit:
//!
//! - [`Hub::prepare`]: checks that no other transaction is in flight and that
//!   the transaction's base revision is still current, then asks every
//!   listener to prepare. On the first refusal the listeners that already
//!   prepared are rolled back (in the order they prepared) and every failure
//!   is returned as one [`Error::Aborted`].
//! - [`Hub::activate`]: swaps in the new snapshot under a freshly allocated
//!   revision, then notifies the prepared listeners. Callback failures are
//!   reported as [`Error::PartiallyCommitted`]; the swap is never undone.
//! - [`Hub::rollback`]: releases the hub and notifies the prepared listeners;
//!   the current snapshot is untouched. Dropping a [`PreparedCommit`] without
//!   calling either has the same effect.
//!
//! [`Hub::commit`] runs prepare and activate back to back.
//!
//! # Example
//!
//! ```
//! use confhub::Hub;
//! use confhub_core::Value;
//!
//! let hub = Hub::new();
//! let txn = hub.new_transaction();
//! txn.find_or_add_type("Widget").unwrap();
//!
//! let prepared = hub.prepare(&txn, Some(Value::from("add widgets"))).unwrap();
//! assert!(hub.in_transaction());
//!
//! let snapshot = hub.activate(prepared).unwrap();
//! assert_eq!(snapshot.revision(), hub.revision());
//! assert!(!hub.in_transaction());
//! ```

use crate::change::ChangeRecord;
use crate::error::{Error, MultiError, Result, StateError};
use crate::hub::Hub;
use crate::listener::{CommittedChange, HubListener, ProposedChange};
use crate::revision::next_revision;
use crate::snapshot::Snapshot;
use crate::transaction::WritableDatabase;
use crate::types::TypeSet;
use confhub_core::Value;
use std::sync::Arc;

/// A transaction that every listener has prepared
///
/// Produced by [`Hub::prepare`] and consumed by exactly one of
/// [`Hub::activate`] or [`Hub::rollback`]. Holding one keeps the hub
/// claimed; dropping one unsettled rolls it back on the hub that prepared it.
pub struct PreparedCommit {
    txn: WritableDatabase,
    current: Arc<Snapshot>,
    proposed: TypeSet,
    message: Option<Value>,
    changes: Vec<ChangeRecord>,
    listeners: Vec<Arc<dyn HubListener>>,
    settled: bool,
}

impl PreparedCommit {
    /// The snapshot that was current when the transaction was prepared
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// The contents that activation will publish
    pub fn proposed(&self) -> &TypeSet {
        &self.proposed
    }

    /// The commit message
    pub fn message(&self) -> Option<&Value> {
        self.message.as_ref()
    }

    /// The transaction's change log
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Names of the listeners that prepared, in the order they prepared
    pub fn prepared_listeners(&self) -> Vec<String> {
        self.listeners.iter().map(|l| l.name().to_string()).collect()
    }

    fn proposed_change(&self) -> ProposedChange<'_> {
        ProposedChange {
            current: &self.current,
            proposed: &self.proposed,
            message: self.message.as_ref(),
            changes: &self.changes,
        }
    }
}

impl Drop for PreparedCommit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let hub = self.txn.hub().clone();
        tracing::warn!(
            hub = %hub.config().name,
            base_revision = self.current.revision(),
            listeners = self.listeners.len(),
            "prepared transaction dropped without activate or rollback"
        );
        let mut failures = MultiError::new();
        hub.abandon(self, &mut failures);
    }
}

impl std::fmt::Debug for PreparedCommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCommit")
            .field("base_revision", &self.current.revision())
            .field("changes", &self.changes.len())
            .field("listeners", &self.prepared_listeners())
            .finish()
    }
}

impl Hub {
    /// Prepare and activate a transaction in one step
    ///
    /// Returns the newly published snapshot.
    pub fn commit(&self, txn: &WritableDatabase, message: Option<Value>) -> Result<Arc<Snapshot>> {
        let prepared = self.prepare(txn, message)?;
        self.activate(prepared)
    }

    /// First phase: validate the transaction and prepare every listener
    ///
    /// Without an explicit `message` the one stored with
    /// [`WritableDatabase::set_commit_message`] is used. Marks the
    /// transaction committed whatever the outcome. On failure the hub's
    /// state is exactly what it was before the call.
    pub fn prepare(&self, txn: &WritableDatabase, message: Option<Value>) -> Result<PreparedCommit> {
        if !txn.hub().is_same(self) {
            return Err(Error::invalid_argument(
                "transaction was opened on a different hub",
            ));
        }

        let changes = txn.seal()?;
        let message = message.or_else(|| txn.commit_message());

        let current = match self.begin_transaction(txn.base_revision()) {
            Ok(current) => current,
            Err(e) => {
                self.dispose_removed(txn, &self.current_snapshot());
                return Err(e);
            }
        };

        // From here on the hub is claimed; if a listener panics, dropping
        // `prepared` releases it and rolls back whoever already prepared.
        let proposed = txn.freeze();
        let mut prepared = PreparedCommit {
            txn: txn.clone(),
            current,
            proposed,
            message,
            changes,
            listeners: Vec::new(),
            settled: false,
        };

        for listener in self.shared.listeners.list_all() {
            if let Err(source) = listener.prepare(&prepared.proposed_change()) {
                let name = listener.name().to_string();
                tracing::warn!(
                    hub = %self.shared.config.name,
                    listener = %name,
                    error = %source,
                    "listener refused to prepare"
                );

                let mut failures = MultiError::new();
                failures.push(Error::PrepareFailed {
                    listener: name,
                    source,
                });
                self.abandon(&mut prepared, &mut failures);

                tracing::debug!(
                    hub = %self.shared.config.name,
                    base_revision = prepared.current.revision(),
                    failures = failures.len(),
                    "transaction aborted during prepare"
                );
                return Err(Error::Aborted(failures));
            }
            prepared.listeners.push(listener);
        }

        Ok(prepared)
    }

    /// Second phase: publish the prepared transaction
    ///
    /// The swap happens before any commit callback runs and is final. If
    /// callbacks fail, [`Error::PartiallyCommitted`] carries the published
    /// revision and every failure. A transaction prepared on another hub is
    /// rolled back there and rejected.
    pub fn activate(&self, mut prepared: PreparedCommit) -> Result<Arc<Snapshot>> {
        if !prepared.txn.hub().is_same(self) {
            return Err(Self::reject_foreign(prepared));
        }

        let (old, new) = {
            let mut state = self.shared.state.lock();
            state.in_transaction = state.in_transaction.saturating_sub(1);
            prepared.settled = true;

            let new = Arc::new(Snapshot::new(next_revision(), prepared.proposed.clone()));
            let old = std::mem::replace(&mut state.current, Arc::clone(&new));
            (old, new)
        };

        let config = &self.shared.config;
        tracing::debug!(
            hub = %config.name,
            from_revision = old.revision(),
            revision = new.revision(),
            changes = prepared.changes.len(),
            "published snapshot"
        );
        if config.trace_changes {
            for change in &prepared.changes {
                tracing::trace!(hub = %config.name, revision = new.revision(), %change);
            }
        }

        self.dispose_removed(&prepared.txn, &new);

        let committed = CommittedChange {
            old: &old,
            new: &new,
            message: prepared.message.as_ref(),
            changes: &prepared.changes,
        };
        let mut failures = MultiError::new();
        for listener in &prepared.listeners {
            if let Err(source) = listener.commit(&committed) {
                tracing::warn!(
                    hub = %config.name,
                    listener = %listener.name(),
                    revision = new.revision(),
                    error = %source,
                    "listener failed after publication"
                );
                failures.push(Error::CommitFailed {
                    listener: listener.name().to_string(),
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(new)
        } else {
            Err(Error::PartiallyCommitted {
                revision: new.revision(),
                failures,
            })
        }
    }

    /// Second phase, failure path: abandon the prepared transaction
    ///
    /// Every prepared listener is rolled back, even if an earlier rollback
    /// fails; failures are returned together as [`Error::Aborted`].
    pub fn rollback(&self, mut prepared: PreparedCommit) -> Result<()> {
        if !prepared.txn.hub().is_same(self) {
            return Err(Self::reject_foreign(prepared));
        }

        tracing::debug!(
            hub = %self.shared.config.name,
            base_revision = prepared.current.revision(),
            listeners = prepared.listeners.len(),
            "rolling back prepared transaction"
        );

        let mut failures = MultiError::new();
        self.abandon(&mut prepared, &mut failures);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Aborted(failures))
        }
    }

    /// Claim the hub for one transaction based on `base_revision`
    fn begin_transaction(&self, base_revision: u64) -> Result<Arc<Snapshot>> {
        let mut state = self.shared.state.lock();
        if state.in_transaction != 0 {
            return Err(StateError::TransactionInProgress.into());
        }
        let current = state.current.revision();
        if base_revision != current {
            return Err(Error::ConcurrentModification {
                base: base_revision,
                current,
            });
        }
        state.in_transaction += 1;
        Ok(Arc::clone(&state.current))
    }

    /// Release the hub, then roll back every prepared listener
    fn abandon(&self, prepared: &mut PreparedCommit, failures: &mut MultiError) {
        prepared.settled = true;
        let current = {
            let mut state = self.shared.state.lock();
            state.in_transaction = state.in_transaction.saturating_sub(1);
            Arc::clone(&state.current)
        };
        self.dispose_removed(&prepared.txn, &current);
        self.notify_rollback(prepared, failures);
    }

    /// Roll `prepared` back on its own hub and build the mismatch error
    fn reject_foreign(prepared: PreparedCommit) -> Error {
        let owner = prepared.txn.hub().clone();
        if let Err(e) = owner.rollback(prepared) {
            tracing::warn!(
                hub = %owner.config().name,
                error = %e,
                "misdirected prepared transaction rolled back with failures"
            );
        }
        Error::invalid_argument("prepared transaction belongs to a different hub")
    }

    /// Roll back every prepared listener, in order, collecting failures
    fn notify_rollback(&self, prepared: &PreparedCommit, failures: &mut MultiError) {
        let change = prepared.proposed_change();
        for listener in &prepared.listeners {
            if let Err(source) = listener.rollback(&change) {
                tracing::warn!(
                    hub = %self.shared.config.name,
                    listener = %listener.name(),
                    error = %source,
                    "listener failed to roll back"
                );
                failures.push(Error::RollbackFailed {
                    listener: listener.name().to_string(),
                    source,
                });
            }
        }
    }

    fn dispose_removed(&self, txn: &WritableDatabase, live: &Snapshot) {
        if !self.shared.config.dispose_removed_helpers {
            return;
        }
        let disposed = txn.dispose_removed(live);
        if disposed > 0 {
            tracing::trace!(
                hub = %self.shared.config.name,
                disposed,
                "disposed reflection helpers of removed types"
            );
        }
    }
}
