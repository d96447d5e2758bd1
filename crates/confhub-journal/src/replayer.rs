//! Replay functionality for journal data
//!
//! Rebuilds hub contents from recorded commits. A journal that was attached
//! to a hub from its creation replays to exactly the snapshot published at
//! any recorded revision.

use crate::journal::{ChangeEntry, JournalEntry};
use crate::{Error, Result};
use confhub::{ChangeCategory, Snapshot};
use confhub_core::Value;
use indexmap::IndexMap;

/// Hub contents rebuilt from a journal: type name to instance key to bean
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayedState {
    types: IndexMap<String, IndexMap<String, Value>>,
}

impl ReplayedState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the beans of a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let types = snapshot
            .types()
            .iter()
            .map(|ty| {
                let beans = ty
                    .instances()
                    .iter()
                    .map(|(key, instance)| (key.clone(), instance.bean().clone()))
                    .collect();
                (ty.name().to_string(), beans)
            })
            .collect();
        Self { types }
    }

    /// Apply one recorded change
    pub fn apply(&mut self, change: &ChangeEntry) {
        match change.category {
            ChangeCategory::AddType => {
                self.types.entry(change.type_name.clone()).or_default();
            }
            ChangeCategory::RemoveType => {
                self.types.shift_remove(&change.type_name);
            }
            ChangeCategory::AddInstance | ChangeCategory::ModifyInstance => {
                if let (Some(key), Some(bean)) = (&change.instance_key, &change.new_bean) {
                    self.types
                        .entry(change.type_name.clone())
                        .or_default()
                        .insert(key.clone(), bean.clone());
                }
            }
            ChangeCategory::RemoveInstance => {
                if let (Some(key), Some(beans)) =
                    (&change.instance_key, self.types.get_mut(&change.type_name))
                {
                    beans.shift_remove(key);
                }
            }
        }
    }

    /// Names of all types, in order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Get a bean
    pub fn get(&self, type_name: &str, key: &str) -> Option<&Value> {
        self.types.get(type_name)?.get(key)
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if there are no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Whether a snapshot holds exactly these types, keys and beans
    ///
    /// Order is not compared.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        let types = snapshot.types();
        types.len() == self.types.len()
            && self.types.iter().all(|(name, beans)| {
                types.get_type(name).is_some_and(|ty| {
                    ty.len() == beans.len()
                        && beans.iter().all(|(key, bean)| {
                            ty.get_instance(key).is_some_and(|i| i.bean() == bean)
                        })
                })
            })
    }
}

/// Replayer for journal data
///
/// Steps through committed entries in order, skipping rollbacks.
pub struct Replayer<'a> {
    entries: &'a [JournalEntry],
    position: usize,
    current_revision: Option<u64>,
}

impl<'a> Replayer<'a> {
    /// Create a new replayer over journal entries
    pub fn new(entries: &'a [JournalEntry]) -> Self {
        Self {
            entries,
            position: 0,
            current_revision: None,
        }
    }

    /// Revision reached by the last applied entry
    pub fn current_revision(&self) -> Option<u64> {
        self.current_revision
    }

    /// Get the first published revision in the journal
    pub fn first_revision(&self) -> Option<u64> {
        self.entries.iter().find_map(JournalEntry::revision)
    }

    /// Get the last published revision in the journal
    pub fn last_revision(&self) -> Option<u64> {
        self.entries.iter().rev().find_map(JournalEntry::revision)
    }

    /// Whether every committed entry has been applied
    pub fn is_finished(&self) -> bool {
        self.entries[self.position..].iter().all(|e| !e.is_commit())
    }

    /// Restart from the first entry
    pub fn reset(&mut self) {
        self.position = 0;
        self.current_revision = None;
    }

    /// Apply the next committed entry to `state`
    ///
    /// Returns the revision reached, or `None` at the end of the journal.
    pub fn step_forward(&mut self, state: &mut ReplayedState) -> Option<u64> {
        while let Some(entry) = self.entries.get(self.position) {
            self.position += 1;
            if let Some(revision) = entry.revision() {
                for change in entry.changes() {
                    state.apply(change);
                }
                self.current_revision = Some(revision);
                return Some(revision);
            }
        }
        None
    }

    /// Replay from an empty state up to and including `revision`
    pub fn replay_to(&mut self, revision: u64) -> Result<ReplayedState> {
        self.replay_onto(ReplayedState::new(), revision)
    }

    /// Replay on top of `base` up to and including `revision`
    pub fn replay_onto(&mut self, base: ReplayedState, revision: u64) -> Result<ReplayedState> {
        if !self.entries.iter().any(|e| e.revision() == Some(revision)) {
            return Err(Error::RevisionNotFound(revision));
        }

        self.reset();
        let mut state = base;
        while let Some(reached) = self.step_forward(&mut state) {
            if reached == revision {
                break;
            }
        }
        Ok(state)
    }

    /// Replay every committed entry from an empty state
    pub fn replay_all(&mut self) -> ReplayedState {
        self.reset();
        let mut state = ReplayedState::new();
        while self.step_forward(&mut state).is_some() {}
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::CommitJournal;
    use confhub::{Hub, ListenerSet};
    use std::sync::Arc;

    fn recorded_hub() -> (Hub, Arc<CommitJournal>) {
        let journal = Arc::new(CommitJournal::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        (Hub::builder().listeners(listeners).build(), journal)
    }

    #[test]
    fn test_replay_matches_every_published_snapshot() {
        let (hub, journal) = recorded_hub();
        let mut snapshots = Vec::new();

        let txn = hub.new_transaction();
        let servers = txn.find_or_add_type("Server").unwrap();
        servers.add_instance("srv1", Value::bean([("port", 80)]), None).unwrap();
        servers.add_instance("srv2", Value::bean([("port", 81)]), None).unwrap();
        snapshots.push(txn.commit(None).unwrap());

        let txn = hub.new_transaction();
        txn.get_type("Server")
            .unwrap()
            .modify_instance("srv2", Value::bean([("port", 443)]), Vec::new())
            .unwrap();
        txn.find_or_add_type("Client")
            .unwrap()
            .add_instance("c1", Value::bean([("server", "srv2")]), None)
            .unwrap();
        snapshots.push(txn.commit(None).unwrap());

        let txn = hub.new_transaction();
        txn.remove_type("Server").unwrap();
        snapshots.push(txn.commit(None).unwrap());

        let entries = journal.entries();
        let mut replayer = Replayer::new(&entries);
        for snapshot in &snapshots {
            let state = replayer.replay_to(snapshot.revision()).unwrap();
            assert!(state.matches(snapshot), "mismatch at {}", snapshot.revision());
        }

        let second = replayer.replay_to(snapshots[1].revision()).unwrap();
        assert_eq!(second.get("Server", "srv2"), Some(&Value::bean([("port", 443)])));
        assert!(!second.matches(&snapshots[2]));
    }

    #[test]
    fn test_unknown_revision() {
        let (hub, journal) = recorded_hub();
        let published = hub.new_transaction().commit(None).unwrap();

        let entries = journal.entries();
        let mut replayer = Replayer::new(&entries);
        assert!(matches!(
            replayer.replay_to(published.revision() + 1_000_000),
            Err(Error::RevisionNotFound(_))
        ));
    }

    #[test]
    fn test_step_forward_skips_rollbacks() {
        struct VetoOnce(parking_lot::Mutex<bool>);

        impl confhub::HubListener for VetoOnce {
            fn prepare(
                &self,
                _: &confhub::ProposedChange<'_>,
            ) -> std::result::Result<(), confhub::ListenerError> {
                let mut vetoed = self.0.lock();
                if *vetoed {
                    return Ok(());
                }
                *vetoed = true;
                Err("not yet".into())
            }
        }

        let journal = Arc::new(CommitJournal::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        listeners.register(Arc::new(VetoOnce(parking_lot::Mutex::new(false))));
        let hub = Hub::builder().listeners(listeners).build();

        assert!(hub.new_transaction().commit(None).is_err());
        let published = hub.new_transaction().commit(None).unwrap();

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        let mut replayer = Replayer::new(&entries);
        assert_eq!(replayer.first_revision(), Some(published.revision()));
        assert!(!replayer.is_finished());

        let mut state = ReplayedState::new();
        assert_eq!(replayer.step_forward(&mut state), Some(published.revision()));
        assert_eq!(replayer.step_forward(&mut state), None);
        assert!(replayer.is_finished());
        assert!(state.matches(&published));
    }

    #[test]
    fn test_replay_onto_captured_snapshot() {
        let hub = Hub::new();
        let txn = hub.new_transaction();
        txn.find_or_add_type("Server")
            .unwrap()
            .add_instance("srv1", Value::bean([("port", 80)]), None)
            .unwrap();
        txn.commit(None).unwrap();

        // Journal attached late: replay starts from the captured state
        let base = ReplayedState::from_snapshot(&hub.current_snapshot());
        let journal = Arc::new(CommitJournal::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        let late = Hub::builder().listeners(listeners).build();
        let txn = late.new_transaction();
        txn.find_or_add_type("Server")
            .unwrap()
            .add_instance("srv2", Value::bean([("port", 81)]), None)
            .unwrap();
        let published = txn.commit(None).unwrap();

        let entries = journal.entries();
        let state = Replayer::new(&entries)
            .replay_onto(base, published.revision())
            .unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.get("Server", "srv1").is_some());
        assert!(state.get("Server", "srv2").is_some());
        assert_eq!(state.type_names().collect::<Vec<_>>(), vec!["Server"]);
    }
}
