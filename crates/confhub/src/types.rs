//! Read-only types and the frozen type index
//!
//! A [`Type`] is a named, read-only collection of [`Instance`]s. Once a type
//! is part of a [`TypeSet`] nothing about it changes except the in-place
//! metadata of its instances.
//!
//! # Structural sharing
//!
//! The instance map is held behind an `Arc`. A writable copy of a type starts
//! out sharing that map and only clones it on its first mutation
//! (`Arc::make_mut`), so a map referenced by a published type is never
//! mutated. A type that was not touched by a transaction is carried into the
//! next snapshot as the very same `Arc<Type>`.

use crate::instance::{Instance, InstanceMap};
use confhub_core::{ReflectionHelper, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A named, read-only map from instance key to [`Instance`]
#[derive(Debug)]
pub struct Type {
    name: String,
    instances: Arc<InstanceMap>,
    metadata: Option<Value>,
    helper: Arc<dyn ReflectionHelper>,
}

impl Type {
    pub(crate) fn new(
        name: String,
        instances: Arc<InstanceMap>,
        metadata: Option<Value>,
        helper: Arc<dyn ReflectionHelper>,
    ) -> Self {
        Self {
            name,
            instances,
            metadata,
            helper,
        }
    }

    /// Type name (unique within a database)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All instances, in insertion order
    pub fn instances(&self) -> &InstanceMap {
        &self.instances
    }

    /// Get an instance by key
    pub fn get_instance(&self, key: &str) -> Option<&Arc<Instance>> {
        self.instances.get(key)
    }

    /// Instance keys, in insertion order
    pub fn instance_keys(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// True if the type holds no instance
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Type-level metadata
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// The reflection helper used to diff beans of this type
    pub fn helper(&self) -> &Arc<dyn ReflectionHelper> {
        &self.helper
    }

    pub(crate) fn instances_arc(&self) -> &Arc<InstanceMap> {
        &self.instances
    }
}

/// An immutable, ordered index of types
///
/// Cloning is O(1). A `TypeSet` is what a transaction freezes into when it is
/// prepared, and what a [`Snapshot`](crate::Snapshot) publishes.
#[derive(Debug, Clone, Default)]
pub struct TypeSet {
    types: Arc<IndexMap<String, Arc<Type>>>,
}

impl TypeSet {
    pub(crate) fn from_map(types: IndexMap<String, Arc<Type>>) -> Self {
        Self {
            types: Arc::new(types),
        }
    }

    /// Get a type by name
    pub fn get_type(&self, name: &str) -> Option<&Arc<Type>> {
        self.types.get(name)
    }

    /// Get an instance by type name and key
    pub fn get_instance(&self, type_name: &str, key: &str) -> Option<&Arc<Instance>> {
        self.get_type(type_name)
            .and_then(|ty| ty.get_instance(key))
    }

    /// All types, in the order they were first added
    pub fn get_all_types(&self) -> Vec<Arc<Type>> {
        self.types.values().cloned().collect()
    }

    /// Iterate over all types
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Type>> {
        self.types.values()
    }

    /// Names of all types
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if there are no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Write one `Name -> [k1, k2]` line per type
    pub(crate) fn write_dump(&self, f: &mut impl fmt::Write) -> fmt::Result {
        for ty in self.types.values() {
            let keys: Vec<&str> = ty.instance_keys().collect();
            writeln!(f, "{} -> [{}]", ty.name(), keys.join(", "))?;
        }
        Ok(())
    }
}
