//! Snapshot - Immutable, revision-tagged view of the whole store
//!
//! Readers obtain the current snapshot from the [`Hub`](crate::Hub) and can
//! read from it without any synchronization: nothing reachable from a
//! snapshot is ever mutated, except instance metadata which carries its own
//! lock.
//!
//! # Design
//!
//! Snapshots use `Arc` for structural sharing:
//! - **Cloning a snapshot's type index is O(1)**
//! - **Untouched types are shared between revisions** (same `Arc<Type>`)
//! - **Publishing is a reference swap** performed by the hub
//!
//! # Example
//!
//! ```
//! use confhub::Hub;
//! use confhub_core::Value;
//!
//! let hub = Hub::new();
//! let txn = hub.new_transaction();
//! txn.find_or_add_type("Server")
//!     .unwrap()
//!     .add_instance("srv1", Value::bean([("port", 80)]), None)
//!     .unwrap();
//! txn.commit(None).unwrap();
//!
//! let snapshot = hub.current_snapshot();
//! let port = snapshot
//!     .get_instance("Server", "srv1")
//!     .and_then(|i| i.bean().get("port").cloned());
//! assert_eq!(port, Some(Value::Int(80)));
//! ```

use crate::instance::Instance;
use crate::types::{Type, TypeSet};
use std::fmt;
use std::sync::Arc;

/// An immutable set of types at a point in time
///
/// # Thread Safety
///
/// `Snapshot` is `Send + Sync` (auto-derived), allowing it to be shared
/// across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    revision: u64,
    types: TypeSet,
}

impl Snapshot {
    pub(crate) fn new(revision: u64, types: TypeSet) -> Self {
        Self { revision, types }
    }

    /// Revision number of this snapshot
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The frozen type index
    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    /// Get a type by name
    pub fn get_type(&self, name: &str) -> Option<&Arc<Type>> {
        self.types.get_type(name)
    }

    /// Get an instance by type name and key
    pub fn get_instance(&self, type_name: &str, key: &str) -> Option<&Arc<Instance>> {
        self.types.get_instance(type_name, key)
    }

    /// All types, in the order they were first added
    pub fn get_all_types(&self) -> Vec<Arc<Type>> {
        self.types.get_all_types()
    }

    /// Human-readable listing of the snapshot
    ///
    /// The first line names the revision; every following line lists one type
    /// as `Name -> [key1, key2]`.
    pub fn dump_as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "revision {}", self.revision)?;
        self.types.write_dump(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hub;
    use confhub_core::Value;

    fn servers_hub() -> Hub {
        let hub = Hub::new();
        let txn = hub.new_transaction();
        let servers = txn.find_or_add_type("Server").unwrap();
        servers
            .add_instance("srv1", Value::bean([("port", 80)]), None)
            .unwrap();
        servers
            .add_instance("srv2", Value::bean([("port", 443)]), None)
            .unwrap();
        txn.commit(None).unwrap();
        hub
    }

    #[test]
    fn test_dump_lists_types_and_keys() {
        let hub = servers_hub();
        let snapshot = hub.current_snapshot();
        let dump = snapshot.dump_as_string();

        assert!(dump.starts_with(&format!("revision {}\n", snapshot.revision())));
        assert!(dump.lines().any(|line| line == "Server -> [srv1, srv2]"));
    }

    #[test]
    fn test_empty_snapshot_dump() {
        let hub = Hub::new();
        let snapshot = hub.current_snapshot();
        assert_eq!(
            snapshot.dump_as_string(),
            format!("revision {}\n", snapshot.revision())
        );
        assert!(snapshot.get_all_types().is_empty());
    }

    #[test]
    fn test_snapshot_reads() {
        let hub = servers_hub();
        let snapshot = hub.current_snapshot();

        assert!(snapshot.get_type("Server").is_some());
        assert!(snapshot.get_type("Client").is_none());
        assert_eq!(snapshot.get_all_types().len(), 1);
        assert_eq!(
            snapshot
                .get_instance("Server", "srv2")
                .and_then(|i| i.bean().get("port").cloned()),
            Some(Value::Int(443))
        );
    }

    #[test]
    fn test_snapshot_unaffected_by_later_commits() {
        let hub = servers_hub();
        let before = hub.current_snapshot();

        let txn = hub.new_transaction();
        txn.find_or_add_type("Server")
            .unwrap()
            .remove_instance("srv1")
            .unwrap();
        txn.commit(None).unwrap();

        assert!(before.get_instance("Server", "srv1").is_some());
        assert!(hub.current_snapshot().get_instance("Server", "srv1").is_none());
    }

    #[test]
    fn test_snapshot_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Snapshot>();
    }
}
