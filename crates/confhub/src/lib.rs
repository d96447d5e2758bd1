//! Confhub - Versioned, transactional in-memory configuration database
//!
//! A [`Hub`] holds typed collections of named bean instances and exposes them
//! as immutable, point-in-time [`Snapshot`]s. Writers open a
//! [`WritableDatabase`], mutate a private copy-on-write working copy, and
//! publish it atomically as the next snapshot.
//!
//! ## Architecture
//!
//! ```text
//! Hub (current snapshot + in-transaction counter)
//!  │
//!  ├── Snapshot (revision + TypeSet) ← readers, lock-free after lookup
//!  │    └── Type → Instance[]        ← shared between snapshots
//!  │
//!  ├── WritableDatabase (transaction)
//!  │    ├── WritableType[]           ← copy-on-write views of Types
//!  │    └── ChangeRecord log         ← ordered, with property diffs
//!  │
//!  └── ListenerRegistry → HubListener[] (prepare / commit / rollback)
//! ```
//!
//! ## Key Components
//!
//! - [`Hub`]: owns the current snapshot and runs the commit protocol
//! - [`WritableDatabase`] / [`WritableType`]: a transaction and its types
//! - [`ChangeRecord`]: one entry of a transaction's change log
//! - [`HubListener`]: participant in prepare/commit/rollback
//! - [`TwoPhaseResource`] / [`TwoPhaseCommit`]: external two-phase participation
//!
//! ## Guarantees
//!
//! 1. **Readers never see a partial commit** - a snapshot is immutable once published
//! 2. **One writer at a time** - a second prepare fails fast while one is in flight
//! 3. **Stale writers lose** - a transaction based on an old revision is rejected
//! 4. **Revisions only grow** - across every hub in the process

pub mod change;
mod commit;
mod config;
mod error;
mod hub;
mod instance;
mod listener;
mod revision;
mod snapshot;
mod transaction;
mod two_phase;
mod types;
mod writable_type;

pub use change::{instance_index, replay, ChangeCategory, ChangeRecord, ReplayIndex};
pub use commit::PreparedCommit;
pub use config::HubConfig;
pub use error::{Error, ListenerError, MultiError, Result, StateError};
pub use hub::{Hub, HubBuilder};
pub use instance::{Instance, InstanceMap};
pub use listener::{CommittedChange, HubListener, ListenerRegistry, ListenerSet, ProposedChange};
pub use revision::last_revision;
pub use snapshot::Snapshot;
pub use transaction::WritableDatabase;
pub use two_phase::{TransactionResource, TwoPhaseCommit, TwoPhaseResource};
pub use types::{Type, TypeSet};
pub use writable_type::WritableType;
