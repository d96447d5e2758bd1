//! Two-phase commit participation
//!
//! A hub transaction can be one participant of a larger commit that also
//! touches unrelated resources. Each participant implements
//! [`TwoPhaseResource`]; a coordinator calls `prepare` on every participant
//! and then either `activate` or `rollback` on each of them exactly once.
//!
//! [`TwoPhaseCommit`] is a simple in-process coordinator.

use crate::commit::PreparedCommit;
use crate::error::{Error, MultiError, Result, StateError};
use crate::transaction::WritableDatabase;
use confhub_core::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// A participant of a two-phase commit
pub trait TwoPhaseResource: Send + Sync {
    /// Validate and stage; nothing is visible yet
    fn prepare(&self) -> Result<()>;

    /// Make the staged change visible
    fn activate(&self) -> Result<()>;

    /// Discard the staged change
    fn rollback(&self) -> Result<()>;

    /// Name used to attribute errors and log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

enum Stage {
    Idle,
    Prepared(PreparedCommit),
    Done,
}

/// Adapter exposing a [`WritableDatabase`] as a [`TwoPhaseResource`]
///
/// Obtained from [`WritableDatabase::as_two_phase_resource`].
///
/// ```
/// use confhub::{Hub, TwoPhaseResource};
///
/// let hub = Hub::new();
/// let txn = hub.new_transaction();
/// txn.find_or_add_type("Widget").unwrap();
///
/// let resource = txn.as_two_phase_resource(None);
/// resource.prepare().unwrap();
/// resource.activate().unwrap();
/// assert!(hub.get_type("Widget").is_some());
///
/// // The prepared state has been consumed
/// assert!(resource.activate().is_err());
/// ```
pub struct TransactionResource {
    txn: WritableDatabase,
    message: Option<Value>,
    stage: Mutex<Stage>,
}

impl TransactionResource {
    pub(crate) fn new(txn: WritableDatabase, message: Option<Value>) -> Self {
        Self {
            txn,
            message,
            stage: Mutex::new(Stage::Idle),
        }
    }

    /// The wrapped transaction
    pub fn transaction(&self) -> &WritableDatabase {
        &self.txn
    }

    /// Whether `prepare` succeeded and neither `activate` nor `rollback` ran yet
    pub fn is_prepared(&self) -> bool {
        matches!(*self.stage.lock(), Stage::Prepared(_))
    }
}

impl TwoPhaseResource for TransactionResource {
    fn prepare(&self) -> Result<()> {
        let mut stage = self.stage.lock();
        if !matches!(*stage, Stage::Idle) {
            return Err(StateError::AlreadyCommitted.into());
        }
        let hub = self.txn.hub();
        match hub.prepare(&self.txn, self.message.clone()) {
            Ok(prepared) => {
                *stage = Stage::Prepared(prepared);
                Ok(())
            }
            Err(e) => {
                *stage = Stage::Done;
                Err(e)
            }
        }
    }

    fn activate(&self) -> Result<()> {
        let prepared = match std::mem::replace(&mut *self.stage.lock(), Stage::Done) {
            Stage::Prepared(prepared) => prepared,
            _ => return Err(StateError::NotPrepared.into()),
        };
        self.txn.hub().activate(prepared).map(drop)
    }

    fn rollback(&self) -> Result<()> {
        match std::mem::replace(&mut *self.stage.lock(), Stage::Done) {
            Stage::Prepared(prepared) => self.txn.hub().rollback(prepared),
            Stage::Idle => {
                tracing::debug!(
                    hub = %self.txn.hub().config().name,
                    base_revision = self.txn.base_revision(),
                    "rollback without prepare, nothing to undo"
                );
                Ok(())
            }
            Stage::Done => Err(StateError::NotPrepared.into()),
        }
    }

    fn name(&self) -> &str {
        &self.txn.hub().config().name
    }
}

impl std::fmt::Debug for TransactionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match *self.stage.lock() {
            Stage::Idle => "idle",
            Stage::Prepared(_) => "prepared",
            Stage::Done => "done",
        };
        f.debug_struct("TransactionResource")
            .field("base_revision", &self.txn.base_revision())
            .field("stage", &stage)
            .finish()
    }
}

/// In-process two-phase commit coordinator
///
/// # Example
///
/// ```
/// use confhub::{Hub, TwoPhaseCommit};
///
/// let config = Hub::new();
/// let routing = Hub::new();
///
/// let a = config.new_transaction();
/// a.find_or_add_type("Server").unwrap();
/// let b = routing.new_transaction();
/// b.find_or_add_type("Route").unwrap();
///
/// let mut coordinator = TwoPhaseCommit::new();
/// coordinator.add(a.as_two_phase_resource(None));
/// coordinator.add(b.as_two_phase_resource(None));
/// coordinator.run().unwrap();
///
/// assert!(config.get_type("Server").is_some());
/// assert!(routing.get_type("Route").is_some());
/// ```
#[derive(Default)]
pub struct TwoPhaseCommit {
    resources: Vec<Arc<dyn TwoPhaseResource>>,
}

impl TwoPhaseCommit {
    /// Create a coordinator with no participants
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant; participants are prepared in the order added
    pub fn add(&mut self, resource: impl TwoPhaseResource + 'static) -> &mut Self {
        self.resources.push(Arc::new(resource));
        self
    }

    /// Add a shared participant
    pub fn add_shared(&mut self, resource: Arc<dyn TwoPhaseResource>) -> &mut Self {
        self.resources.push(resource);
        self
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True if there are no participants
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Prepare every participant, then activate all of them
    ///
    /// On the first prepare failure the participants that already prepared
    /// are rolled back in the order they prepared, and [`Error::Aborted`]
    /// carries the prepare failure followed by any rollback failures. If
    /// every participant prepared, each one is activated even if an earlier
    /// activation fails; failures are returned as [`Error::ActivationFailed`].
    pub fn run(&self) -> Result<()> {
        for (index, resource) in self.resources.iter().enumerate() {
            if let Err(error) = resource.prepare() {
                tracing::warn!(
                    resource = %resource.name(),
                    error = %error,
                    "two-phase participant failed to prepare"
                );
                let mut failures = MultiError::new();
                failures.push(error);
                for prepared in &self.resources[..index] {
                    if let Err(error) = prepared.rollback() {
                        failures.push(error);
                    }
                }
                return Err(Error::Aborted(failures));
            }
        }

        let mut failures = MultiError::new();
        for resource in &self.resources {
            if let Err(error) = resource.activate() {
                tracing::warn!(
                    resource = %resource.name(),
                    error = %error,
                    "two-phase participant failed to activate"
                );
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ActivationFailed(failures))
        }
    }
}

impl std::fmt::Debug for TwoPhaseCommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resources.iter().map(|r| r.name()))
            .finish()
    }
}
