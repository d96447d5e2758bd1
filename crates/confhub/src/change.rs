//! Change records emitted by transactions
//!
//! Every mutation made through a [`WritableDatabase`](crate::WritableDatabase)
//! or [`WritableType`](crate::WritableType) appends one [`ChangeRecord`] to
//! the transaction's log. The log is handed to listeners during prepare,
//! commit and rollback, and can be replayed onto the base snapshot with
//! [`replay`] to reconstruct the transaction's result.

use crate::instance::{Instance, InstanceMap};
use crate::types::TypeSet;
use confhub_core::PropertyChange;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of mutation described by a [`ChangeRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeCategory {
    AddType,
    RemoveType,
    AddInstance,
    RemoveInstance,
    ModifyInstance,
}

impl ChangeCategory {
    /// Upper-case label, e.g. `ADD_INSTANCE`
    pub fn label(&self) -> &'static str {
        match self {
            ChangeCategory::AddType => "ADD_TYPE",
            ChangeCategory::RemoveType => "REMOVE_TYPE",
            ChangeCategory::AddInstance => "ADD_INSTANCE",
            ChangeCategory::RemoveInstance => "REMOVE_INSTANCE",
            ChangeCategory::ModifyInstance => "MODIFY_INSTANCE",
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable description of one mutation
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    category: ChangeCategory,
    type_name: String,
    instance_key: Option<String>,
    new_value: Option<Arc<Instance>>,
    old_value: Option<Arc<Instance>>,
    property_changes: Vec<PropertyChange>,
}

impl ChangeRecord {
    fn new(category: ChangeCategory, type_name: &str) -> Self {
        Self {
            category,
            type_name: type_name.to_string(),
            instance_key: None,
            new_value: None,
            old_value: None,
            property_changes: Vec::new(),
        }
    }

    pub(crate) fn add_type(type_name: &str) -> Self {
        Self::new(ChangeCategory::AddType, type_name)
    }

    pub(crate) fn remove_type(type_name: &str) -> Self {
        Self::new(ChangeCategory::RemoveType, type_name)
    }

    pub(crate) fn add_instance(
        type_name: &str,
        key: &str,
        new_value: Arc<Instance>,
        replaced: Option<Arc<Instance>>,
    ) -> Self {
        Self {
            instance_key: Some(key.to_string()),
            new_value: Some(new_value),
            old_value: replaced,
            ..Self::new(ChangeCategory::AddInstance, type_name)
        }
    }

    pub(crate) fn remove_instance(type_name: &str, key: &str, old_value: Arc<Instance>) -> Self {
        Self {
            instance_key: Some(key.to_string()),
            old_value: Some(old_value),
            ..Self::new(ChangeCategory::RemoveInstance, type_name)
        }
    }

    pub(crate) fn modify_instance(
        type_name: &str,
        key: &str,
        new_value: Arc<Instance>,
        old_value: Arc<Instance>,
        property_changes: Vec<PropertyChange>,
    ) -> Self {
        Self {
            instance_key: Some(key.to_string()),
            new_value: Some(new_value),
            old_value: Some(old_value),
            property_changes,
            ..Self::new(ChangeCategory::ModifyInstance, type_name)
        }
    }

    /// What kind of change this is
    pub fn category(&self) -> ChangeCategory {
        self.category
    }

    /// Name of the affected type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Key of the affected instance (instance-level changes only)
    pub fn instance_key(&self) -> Option<&str> {
        self.instance_key.as_deref()
    }

    /// The instance after the change (add and modify)
    pub fn new_value(&self) -> Option<&Arc<Instance>> {
        self.new_value.as_ref()
    }

    /// The instance before the change (remove, modify, and overwriting add)
    pub fn old_value(&self) -> Option<&Arc<Instance>> {
        self.old_value.as_ref()
    }

    /// Field-level differences (modify only)
    pub fn property_changes(&self) -> &[PropertyChange] {
        &self.property_changes
    }
}

impl fmt::Display for ChangeRecord {
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

/// Type name to instance map, as produced by [`replay`]
pub type ReplayIndex = IndexMap<String, InstanceMap>;

/// Flatten a type index into a [`ReplayIndex`]
pub fn instance_index(types: &TypeSet) -> ReplayIndex {
    types
        .iter()
        .map(|ty| (ty.name().to_string(), ty.instances().clone()))
        .collect()
}

/// Apply a change log, in order, on top of `base`
///
/// Replaying a transaction's change log onto the snapshot it was opened
/// against yields the same types and instances the transaction ends up
/// publishing.
pub fn replay(base: &TypeSet, changes: &[ChangeRecord]) -> ReplayIndex {
    let mut index = instance_index(base);

    for change in changes {
        match change.category {
            ChangeCategory::AddType => {
                index.entry(change.type_name.clone()).or_default();
            }
            ChangeCategory::RemoveType => {
                index.shift_remove(&change.type_name);
            }
            ChangeCategory::AddInstance | ChangeCategory::ModifyInstance => {
                if let (Some(key), Some(value)) = (&change.instance_key, &change.new_value) {
                    index
                        .entry(change.type_name.clone())
                        .or_default()
                        .insert(key.clone(), Arc::clone(value));
                }
            }
            ChangeCategory::RemoveInstance => {
                if let (Some(key), Some(instances)) =
                    (&change.instance_key, index.get_mut(&change.type_name))
                {
                    instances.shift_remove(key);
                }
            }
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hub;
    use confhub_core::Value;

    fn same_index(a: &ReplayIndex, b: &ReplayIndex) -> bool {
        a.len() == b.len()
            && a.iter().zip(b.iter()).all(|((na, ia), (nb, ib))| {
                na == nb
                    && ia.len() == ib.len()
                    && ia
                        .iter()
                        .zip(ib.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && Arc::ptr_eq(va, vb))
            })
    }

    #[test]
    fn test_change_display() {
        let instance = Arc::new(Instance::new(Value::bean([("color", "red")])));
        let add = ChangeRecord::add_instance("Widget", "w1", instance.clone(), None);
        assert_eq!(add.to_string(), "ADD_INSTANCE Widget/w1");

        let modify = ChangeRecord::modify_instance(
            "Widget",
            "w1",
            instance.clone(),
            instance,
            vec![PropertyChange::modified("color", "red", "blue")],
        );
        assert_eq!(
            modify.to_string(),
            "MODIFY_INSTANCE Widget/w1 [color: \"red\" -> \"blue\"]"
        );
        assert_eq!(ChangeRecord::remove_type("Widget").to_string(), "REMOVE_TYPE Widget");
    }

    #[test]
    fn test_replay_reconstructs_transaction_result() {
        let hub = Hub::new();
        let seed = hub.new_transaction();
        let servers = seed.find_or_add_type("Server").unwrap();
        servers.add_instance("srv1", Value::bean([("port", 80)]), None).unwrap();
        servers.add_instance("srv2", Value::bean([("port", 81)]), None).unwrap();
        seed.find_or_add_type("Client").unwrap();
        seed.commit(None).unwrap();

        let base = hub.current_snapshot();
        let txn = hub.new_transaction();
        let servers = txn.find_or_add_type("Server").unwrap();
        servers.remove_instance("srv1").unwrap();
        servers
            .modify_instance("srv2", Value::bean([("port", 8081)]), Vec::new())
            .unwrap();
        servers.add_instance("srv1", Value::bean([("port", 90)]), None).unwrap();
        txn.remove_type("Client").unwrap();
        txn.find_or_add_type("Proxy")
            .unwrap()
            .add_instance("p1", Value::bean([("to", "srv1")]), None)
            .unwrap();

        let replayed = replay(base.types(), &txn.changes());
        let published = txn.commit(None).unwrap();

        assert!(same_index(&replayed, &instance_index(published.types())));
        assert_eq!(
            replayed.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Server", "Proxy"]
        );
    }
}
