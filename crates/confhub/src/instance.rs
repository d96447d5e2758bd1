//! Instance - one stored bean plus its metadata side-channel

use confhub_core::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Instances of one type, keyed by instance key, in insertion order
pub type InstanceMap = IndexMap<String, Arc<Instance>>;

/// A bean value stored in a type
///
/// The bean itself never changes once the instance exists; replacing a bean
/// creates a new `Instance`. The metadata slot is different: it is an
/// annotation that may be updated in place at any time, even on an instance
/// that is part of a published snapshot, and is guarded by its own lock.
#[derive(Debug)]
pub struct Instance {
    bean: Value,
    metadata: Mutex<Option<Value>>,
}

impl Instance {
    /// Create an instance without metadata
    pub fn new(bean: Value) -> Self {
        Self::with_metadata(bean, None)
    }

    /// Create an instance with the given metadata
    pub fn with_metadata(bean: Value, metadata: Option<Value>) -> Self {
        Self {
            bean,
            metadata: Mutex::new(metadata),
        }
    }

    /// The stored bean
    pub fn bean(&self) -> &Value {
        &self.bean
    }

    /// A copy of the current metadata
    pub fn metadata(&self) -> Option<Value> {
        self.metadata.lock().clone()
    }

    /// Replace the metadata in place
    pub fn set_metadata(&self, metadata: Option<Value>) {
        *self.metadata.lock() = metadata;
    }

    /// A new instance holding `bean` and this instance's current metadata
    pub(crate) fn replaced_by(&self, bean: Value) -> Self {
        Self::with_metadata(bean, self.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_metadata_is_mutable_in_place() {
        let instance = Arc::new(Instance::new(Value::bean([("color", "red")])));
        let shared = Arc::clone(&instance);
        assert_eq!(instance.metadata(), None);

        shared.set_metadata(Some(Value::from("annotated")));
        assert_eq!(instance.metadata(), Some(Value::from("annotated")));
    }

    #[test]
    fn test_replaced_by_carries_metadata() {
        let old = Instance::with_metadata(Value::bean([("color", "red")]), Some(7.into()));
        let new = old.replaced_by(Value::bean([("color", "blue")]));

        assert_eq!(new.bean().get("color"), Some(&Value::from("blue")));
        assert_eq!(new.metadata(), Some(Value::Int(7)));
        assert_eq!(old.bean().get("color"), Some(&Value::from("red")));
    }
}
