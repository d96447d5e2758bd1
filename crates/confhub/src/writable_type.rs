//! WritableType - mutable view of a type inside a transaction
//!
//! Each writable type has its own lock, so different types of the same
//! transaction can be mutated from different threads independently. Every
//! successful mutation appends a [`ChangeRecord`] to the owning transaction's
//! log while the type lock is still held, which keeps the log order identical
//! to the order in which the instance map changed.

use crate::change::ChangeRecord;
use crate::error::{Error, Result};
use crate::instance::{Instance, InstanceMap};
use crate::transaction::TxnLog;
use crate::types::Type;
use confhub_core::{PropertyChange, ReflectionHelper, Value};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct TypeState {
    instances: Arc<InstanceMap>,
    metadata: Option<Value>,
    /// Set by any mutation; untouched types are published as their origin
    touched: bool,
    /// Set once the type has been removed from its transaction
    removed: bool,
}

/// A type being edited inside a [`WritableDatabase`](crate::WritableDatabase)
#[derive(Debug)]
pub struct WritableType {
    name: String,
    state: Mutex<TypeState>,
    helper: Arc<dyn ReflectionHelper>,
    origin: Option<Arc<Type>>,
    log: Arc<TxnLog>,
}

impl WritableType {
    /// Writable copy of a published type; shares its instance map until first write
    pub(crate) fn from_type(ty: &Arc<Type>, log: Arc<TxnLog>) -> Self {
        Self {
            name: ty.name().to_string(),
            state: Mutex::new(TypeState {
                instances: Arc::clone(ty.instances_arc()),
                metadata: ty.metadata().cloned(),
                touched: false,
                removed: false,
            }),
            helper: Arc::clone(ty.helper()),
            origin: Some(Arc::clone(ty)),
            log,
        }
    }

    /// A brand new, empty type
    pub(crate) fn new(name: &str, helper: Arc<dyn ReflectionHelper>, log: Arc<TxnLog>) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(TypeState {
                instances: Arc::new(InstanceMap::new()),
                metadata: None,
                touched: true,
                removed: false,
            }),
            helper,
            origin: None,
            log,
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reflection helper used to diff beans of this type
    pub fn helper(&self) -> &Arc<dyn ReflectionHelper> {
        &self.helper
    }

    /// Add an instance, replacing any instance already stored under `key`
    ///
    /// Fails with [`Error::InvalidArgument`] if the key is empty or the bean
    /// is [`Value::Null`]. Appends an `ADD_INSTANCE` change.
    pub fn add_instance(
        &self,
        key: &str,
        bean: Value,
        metadata: Option<Value>,
    ) -> Result<Arc<Instance>> {
        if key.is_empty() {
            return Err(Error::invalid_argument("instance key must not be empty"));
        }
        if bean.is_null() {
            return Err(Error::invalid_argument(format!(
                "bean for {}/{} must not be null",
                self.name, key
            )));
        }

        let mut state = self.state.lock();
        self.check_attached(&state)?;
        let mut log = self.log.open()?;

        let instance = Arc::new(Instance::with_metadata(bean, metadata));
        let replaced =
            Arc::make_mut(&mut state.instances).insert(key.to_string(), Arc::clone(&instance));
        state.touched = true;

        log.push(ChangeRecord::add_instance(
            &self.name,
            key,
            Arc::clone(&instance),
            replaced,
        ));
        Ok(instance)
    }

    /// Remove an instance
    ///
    /// Returns `None` (and records nothing) if no instance has that key.
    /// Otherwise appends a `REMOVE_INSTANCE` change.
    pub fn remove_instance(&self, key: &str) -> Result<Option<Arc<Instance>>> {
        if key.is_empty() {
            return Err(Error::invalid_argument("instance key must not be empty"));
        }

        let mut state = self.state.lock();
        self.check_attached(&state)?;
        let mut log = self.log.open()?;

        if !state.instances.contains_key(key) {
            return Ok(None);
        }

        let removed = Arc::make_mut(&mut state.instances).shift_remove(key);
        state.touched = true;

        if let Some(old) = &removed {
            log.push(ChangeRecord::remove_instance(&self.name, key, Arc::clone(old)));
        }
        Ok(removed)
    }

    /// Replace the bean of an existing instance
    ///
    /// Unlike [`add_instance`](Self::add_instance), the key must already
    /// exist. When `property_changes` is empty the field-level differences are
    /// computed by the type's reflection helper. The differences are returned
    /// and recorded on the `MODIFY_INSTANCE` change. Metadata of the replaced
    /// instance is carried over.
    pub fn modify_instance(
        &self,
        key: &str,
        bean: Value,
        property_changes: Vec<PropertyChange>,
    ) -> Result<Vec<PropertyChange>> {
        if key.is_empty() {
            return Err(Error::invalid_argument("instance key must not be empty"));
        }
        if bean.is_null() {
            return Err(Error::invalid_argument(format!(
                "bean for {}/{} must not be null",
                self.name, key
            )));
        }

        let mut state = self.state.lock();
        self.check_attached(&state)?;
        self.log.ensure_open()?;

        let old = state.instances.get(key).cloned().ok_or_else(|| {
            Error::invalid_argument(format!(
                "cannot modify {}/{}: no such instance",
                self.name, key
            ))
        })?;

        let property_changes = if property_changes.is_empty() {
            self.helper.diff(old.bean(), &bean)?
        } else {
            property_changes
        };

        let mut log = self.log.open()?;
        let instance = Arc::new(old.replaced_by(bean));
        Arc::make_mut(&mut state.instances).insert(key.to_string(), Arc::clone(&instance));
        state.touched = true;

        log.push(ChangeRecord::modify_instance(
            &self.name,
            key,
            instance,
            old,
            property_changes.clone(),
        ));
        Ok(property_changes)
    }

    /// Get an instance by key
    pub fn get_instance(&self, key: &str) -> Option<Arc<Instance>> {
        self.state.lock().instances.get(key).cloned()
    }

    /// Instance keys, in insertion order
    pub fn instance_keys(&self) -> Vec<String> {
        self.state.lock().instances.keys().cloned().collect()
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// True if the type holds no instance
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type-level metadata
    pub fn metadata(&self) -> Option<Value> {
        self.state.lock().metadata.clone()
    }

    /// Replace the type-level metadata (no change record is emitted)
    pub fn set_metadata(&self, metadata: Option<Value>) -> Result<()> {
        let mut state = self.state.lock();
        self.check_attached(&state)?;
        self.log.ensure_open()?;
        state.metadata = metadata;
        state.touched = true;
        Ok(())
    }

    /// Remove every instance and detach the type from its transaction
    ///
    /// Appends one `REMOVE_INSTANCE` per instance followed by `REMOVE_TYPE`,
    /// all under a single hold of the transaction log. Returns the contents as
    /// they were just before removal, taken under the same lock.
    pub(crate) fn remove_all(&self) -> Result<Arc<Type>> {
        let mut state = self.state.lock();
        self.check_attached(&state)?;
        let mut log = self.log.open()?;

        let view = self.view(&state);
        let instances = std::mem::take(&mut state.instances);
        for (key, old) in instances.iter() {
            log.push(ChangeRecord::remove_instance(&self.name, key, Arc::clone(old)));
        }
        log.push(ChangeRecord::remove_type(&self.name));

        state.touched = true;
        state.removed = true;
        Ok(view)
    }

    /// Read-only view of the current contents
    ///
    /// An untouched copy yields the type it was created from.
    pub(crate) fn freeze(&self) -> Arc<Type> {
        self.view(&self.state.lock())
    }

    fn view(&self, state: &TypeState) -> Arc<Type> {
        match &self.origin {
            Some(origin) if !state.touched => Arc::clone(origin),
            _ => Arc::new(Type::new(
                self.name.clone(),
                Arc::clone(&state.instances),
                state.metadata.clone(),
                Arc::clone(&self.helper),
            )),
        }
    }

    fn check_attached(&self, state: &TypeState) -> Result<()> {
        if state.removed {
            return Err(Error::invalid_argument(format!(
                "type {} has been removed from the transaction",
                self.name
            )));
        }
        Ok(())
    }
}
