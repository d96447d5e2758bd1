//! Commit journal: a hub listener that records every published revision
//!
//! # Example
//!
//! ```
//! use confhub::{Hub, ListenerSet};
//! use confhub_core::Value;
//! use confhub_journal::CommitJournal;
//! use std::sync::Arc;
//!
//! let journal = Arc::new(CommitJournal::new());
//! let listeners = Arc::new(ListenerSet::new());
//! listeners.register(journal.clone());
//! let hub = Hub::builder().listeners(listeners).build();
//!
//! let txn = hub.new_transaction();
//! txn.find_or_add_type("Widget")
//!     .unwrap()
//!     .add_instance("w1", Value::bean([("color", "red")]), None)
//!     .unwrap();
//! txn.commit(Some(Value::from("first widget"))).unwrap();
//!
//! let stats = journal.stats();
//! assert_eq!(stats.commit_count, 1);
//! assert_eq!(stats.last_revision, Some(hub.revision()));
//! ```

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use confhub::{
    ChangeCategory, ChangeRecord, CommittedChange, HubListener, ListenerError, ProposedChange,
};
use confhub_core::{PropertyChange, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serializable copy of a [`ChangeRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Kind of mutation
    pub category: ChangeCategory,
    /// Affected type
    pub type_name: String,
    /// Affected instance, for instance-level changes
    pub instance_key: Option<String>,
    /// Bean after the change
    pub new_bean: Option<Value>,
    /// Bean before the change
    pub old_bean: Option<Value>,
    /// Field-level differences, for modifications
    pub property_changes: Vec<PropertyChange>,
}

impl From<&ChangeRecord> for ChangeEntry {
    fn from(record: &ChangeRecord) -> Self {
        Self {
            category: record.category(),
            type_name: record.type_name().to_string(),
            instance_key: record.instance_key().map(str::to_string),
            new_bean: record.new_value().map(|i| i.bean().clone()),
            old_bean: record.old_value().map(|i| i.bean().clone()),
            property_changes: record.property_changes().to_vec(),
        }
    }
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.type_name)?;
        if let Some(key) = &self.instance_key {
            write!(f, "/{}", key)?;
        }
        for change in &self.property_changes {
            write!(f, " [{}]", change)?;
        }
        Ok(())
    }
}

/// A recorded commit outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEntry {
    /// A snapshot was published
    Committed {
        /// Revision that was replaced
        from_revision: u64,
        /// Revision that was published
        to_revision: u64,
        /// Commit message
        message: Option<Value>,
        /// The transaction's change log
        changes: Vec<ChangeEntry>,
        /// When the commit was observed
        recorded_at: DateTime<Utc>,
    },
    /// A prepared transaction was abandoned
    RolledBack {
        /// Revision the transaction was based on
        base_revision: u64,
        /// Commit message
        message: Option<Value>,
        /// Number of changes that were discarded
        change_count: usize,
        /// When the rollback was observed
        recorded_at: DateTime<Utc>,
    },
}

impl JournalEntry {
    /// When the entry was recorded
    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            JournalEntry::Committed { recorded_at, .. }
            | JournalEntry::RolledBack { recorded_at, .. } => *recorded_at,
        }
    }

    /// The commit message
    pub fn message(&self) -> Option<&Value> {
        match self {
            JournalEntry::Committed { message, .. } | JournalEntry::RolledBack { message, .. } => {
                message.as_ref()
            }
        }
    }

    /// The published revision, for committed entries
    pub fn revision(&self) -> Option<u64> {
        match self {
            JournalEntry::Committed { to_revision, .. } => Some(*to_revision),
            JournalEntry::RolledBack { .. } => None,
        }
    }

    /// The recorded changes (empty for rollbacks)
    pub fn changes(&self) -> &[ChangeEntry] {
        match self {
            JournalEntry::Committed { changes, .. } => changes,
            JournalEntry::RolledBack { .. } => &[],
        }
    }

    /// Whether this entry records a publication
    pub fn is_commit(&self) -> bool {
        matches!(self, JournalEntry::Committed { .. })
    }
}

/// Configuration for the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Record abandoned transactions as well as commits
    pub record_rollbacks: bool,
    /// Maximum number of entries to keep, oldest dropped first (0 = unlimited)
    pub max_entries: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            record_rollbacks: true,
            max_entries: 0, // Unlimited
        }
    }
}

/// Hub listener that keeps an in-memory log of commits and rollbacks
#[derive(Debug, Default)]
pub struct CommitJournal {
    config: JournalConfig,
    entries: RwLock<Vec<JournalEntry>>,
}

impl CommitJournal {
    /// Create a journal with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: JournalConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// The journal configuration
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// A copy of all entries, oldest first
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// The committed entry that published `revision`
    pub fn entry_for_revision(&self, revision: u64) -> Result<JournalEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.revision() == Some(revision))
            .cloned()
            .ok_or(Error::RevisionNotFound(revision))
    }

    /// Get statistics about the journal
    pub fn stats(&self) -> JournalStats {
        JournalStats::from_entries(&self.entries.read())
    }

    /// Insert an entry recorded elsewhere, e.g. loaded from an export
    pub fn record(&self, entry: JournalEntry) {
        let mut entries = self.entries.write();
        entries.push(entry);
        if self.config.max_entries > 0 && entries.len() > self.config.max_entries {
            let excess = entries.len() - self.config.max_entries;
            entries.drain(0..excess);
        }
    }
}

impl HubListener for CommitJournal {
    fn prepare(&self, _change: &ProposedChange<'_>) -> std::result::Result<(), ListenerError> {
        Ok(())
    }

    fn commit(&self, change: &CommittedChange<'_>) -> std::result::Result<(), ListenerError> {
        tracing::trace!(
            revision = change.new.revision(),
            changes = change.changes.len(),
            "journaling commit"
        );
        self.record(JournalEntry::Committed {
            from_revision: change.old.revision(),
            to_revision: change.new.revision(),
            message: change.message.cloned(),
            changes: change.changes.iter().map(ChangeEntry::from).collect(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    fn rollback(&self, change: &ProposedChange<'_>) -> std::result::Result<(), ListenerError> {
        if self.config.record_rollbacks {
            tracing::trace!(
                base_revision = change.current.revision(),
                "journaling rollback"
            );
            self.record(JournalEntry::RolledBack {
                base_revision: change.current.revision(),
                message: change.message.cloned(),
                change_count: change.changes.len(),
                recorded_at: Utc::now(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "commit-journal"
    }
}

/// Statistics about the journal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of committed entries
    pub commit_count: usize,
    /// Number of rolled back entries
    pub rollback_count: usize,
    /// Lowest published revision recorded
    pub first_revision: Option<u64>,
    /// Highest published revision recorded
    pub last_revision: Option<u64>,
}

impl JournalStats {
    /// Compute statistics over a slice of entries
    pub fn from_entries(entries: &[JournalEntry]) -> Self {
        let revisions = entries.iter().filter_map(JournalEntry::revision);
        let commit_count = entries.iter().filter(|e| e.is_commit()).count();

        Self {
            total_entries: entries.len(),
            commit_count,
            rollback_count: entries.len() - commit_count,
            first_revision: revisions.clone().min(),
            last_revision: revisions.max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confhub::{Hub, ListenerSet};
    use std::sync::Arc;

    struct Veto;

    impl HubListener for Veto {
        fn prepare(&self, _: &ProposedChange<'_>) -> std::result::Result<(), ListenerError> {
            Err("vetoed".into())
        }
    }

    fn journaled_hub(config: JournalConfig) -> (Hub, Arc<CommitJournal>, Arc<ListenerSet>) {
        let journal = Arc::new(CommitJournal::with_config(config));
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        let hub = Hub::builder().listeners(listeners.clone()).build();
        (hub, journal, listeners)
    }

    #[test]
    fn test_commit_is_recorded() {
        let (hub, journal, _) = journaled_hub(JournalConfig::default());
        let r0 = hub.revision();

        let txn = hub.new_transaction();
        txn.find_or_add_type("Widget")
            .unwrap()
            .add_instance("w1", Value::bean([("color", "red")]), None)
            .unwrap();
        txn.commit(Some(Value::from("seed"))).unwrap();

        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            JournalEntry::Committed {
                from_revision,
                to_revision,
                message,
                changes,
                ..
            } => {
                assert_eq!(*from_revision, r0);
                assert_eq!(*to_revision, hub.revision());
                assert_eq!(message, &Some(Value::from("seed")));
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[1].to_string(), "ADD_INSTANCE Widget/w1");
                assert_eq!(changes[1].new_bean, Some(Value::bean([("color", "red")])));
            }
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_rollback_recording_is_configurable() {
        let (hub, journal, listeners) = journaled_hub(JournalConfig::default());
        listeners.register(Arc::new(Veto));

        let txn = hub.new_transaction();
        txn.find_or_add_type("Widget").unwrap();
        assert!(txn.commit(None).is_err());

        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            entries[0],
            JournalEntry::RolledBack { change_count: 1, .. }
        ));

        let (hub, journal, listeners) = journaled_hub(JournalConfig {
            record_rollbacks: false,
            ..Default::default()
        });
        listeners.register(Arc::new(Veto));
        assert!(hub.new_transaction().commit(None).is_err());
        assert!(journal.is_empty());
    }

    #[test]
    fn test_max_entries_drops_oldest() {
        let (hub, journal, _) = journaled_hub(JournalConfig {
            max_entries: 2,
            ..Default::default()
        });

        let mut published = Vec::new();
        for _ in 0..3 {
            published.push(hub.new_transaction().commit(None).unwrap().revision());
        }

        let revisions: Vec<_> = journal.entries().iter().filter_map(|e| e.revision()).collect();
        assert_eq!(revisions, published[1..].to_vec());
        assert!(matches!(
            journal.entry_for_revision(published[0]),
            Err(Error::RevisionNotFound(_))
        ));
        assert!(journal.entry_for_revision(published[2]).is_ok());
    }

    #[test]
    fn test_stats() {
        let (hub, journal, listeners) = journaled_hub(JournalConfig::default());
        let first = hub.new_transaction().commit(None).unwrap().revision();
        let second = hub.new_transaction().commit(None).unwrap().revision();
        listeners.register(Arc::new(Veto));
        assert!(hub.new_transaction().commit(None).is_err());

        let stats = journal.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.commit_count, 2);
        assert_eq!(stats.rollback_count, 1);
        assert_eq!(stats.first_revision, Some(first));
        assert_eq!(stats.last_revision, Some(second));

        journal.clear();
        assert_eq!(journal.stats(), JournalStats::default());
    }
}
