//! Property-level diffing of bean values
//!
//! A [`ReflectionHelper`] is attached to every type held by a hub. It knows how
//! to compare two beans of that type and produce the list of
//! [`PropertyChange`]s between them. Helpers are created through a
//! [`HelperFactory`] and released with [`ReflectionHelper::dispose`] once the
//! type they belong to is gone for good.
//!
//! [`FieldDiffer`] is the default helper: it treats beans as
//! [`Value::Map`]s and compares them field by field.

use crate::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One changed property between two versions of a bean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Field name
    pub name: String,
    /// Value before the change (`None` if the field was added)
    pub old: Option<Value>,
    /// Value after the change (`None` if the field was removed)
    pub new: Option<Value>,
}

impl PropertyChange {
    /// Create a property change
    pub fn new(name: impl Into<String>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            name: name.into(),
            old,
            new,
        }
    }

    /// A field present on both sides whose value changed
    pub fn modified(name: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self::new(name, Some(old.into()), Some(new.into()))
    }
}

impl fmt::Display for PropertyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| match v {
            Some(v) => v.to_string(),
            None => "<unset>".to_string(),
        };
        write!(f, "{}: {} -> {}", self.name, show(&self.old), show(&self.new))
    }
}

/// Per-type helper that computes bean diffs
///
/// Implementations may cache per-type information (field layouts and the
/// like); [`dispose`](ReflectionHelper::dispose) releases it.
pub trait ReflectionHelper: Send + Sync + fmt::Debug {
    /// Compare two beans and list the properties that differ
    fn diff(&self, old: &Value, new: &Value) -> Result<Vec<PropertyChange>>;

    /// Release any resources held by this helper
    fn dispose(&self);

    /// Whether [`dispose`](ReflectionHelper::dispose) has been called
    fn is_disposed(&self) -> bool;
}

/// Creates the reflection helper for a newly added type
pub trait HelperFactory: Send + Sync {
    /// Create a helper for the type named `type_name`
    fn create(&self, type_name: &str) -> Arc<dyn ReflectionHelper>;
}

impl<F> HelperFactory for F
where
    F: Fn(&str) -> Arc<dyn ReflectionHelper> + Send + Sync,
{
    fn create(&self, type_name: &str) -> Arc<dyn ReflectionHelper> {
        self(type_name)
    }
}

/// Default helper comparing map-shaped beans field by field
///
/// # Example
///
/// ```
/// use confhub_core::{FieldDiffer, PropertyChange, ReflectionHelper, Value};
///
/// let differ = FieldDiffer::new("Widget");
/// let old = Value::bean([("color", "red")]);
/// let new = Value::bean([("color", "blue")]);
///
/// let changes = differ.diff(&old, &new).unwrap();
/// assert_eq!(changes, vec![PropertyChange::modified("color", "red", "blue")]);
/// ```
#[derive(Debug)]
pub struct FieldDiffer {
    type_name: String,
    disposed: AtomicBool,
}

impl FieldDiffer {
    /// Create a differ for the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            disposed: AtomicBool::new(false),
        }
    }

    /// The type this differ was created for
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl ReflectionHelper for FieldDiffer {
    fn diff(&self, old: &Value, new: &Value) -> Result<Vec<PropertyChange>> {
        if self.is_disposed() {
            return Err(Error::HelperDisposed {
                type_name: self.type_name.clone(),
            });
        }

        let old_fields = old.as_map().ok_or(Error::NotABean {
            found: old.type_name(),
        })?;
        let new_fields = new.as_map().ok_or(Error::NotABean {
            found: new.type_name(),
        })?;

        let mut changes = Vec::new();

        for (name, old_value) in old_fields {
            match new_fields.get(name) {
                Some(new_value) if new_value == old_value => {}
                Some(new_value) => changes.push(PropertyChange::new(
                    name.clone(),
                    Some(old_value.clone()),
                    Some(new_value.clone()),
                )),
                None => changes.push(PropertyChange::new(
                    name.clone(),
                    Some(old_value.clone()),
                    None,
                )),
            }
        }

        for (name, new_value) in new_fields {
            if !old_fields.contains_key(name) {
                changes.push(PropertyChange::new(
                    name.clone(),
                    None,
                    Some(new_value.clone()),
                ));
            }
        }

        Ok(changes)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Factory producing a fresh [`FieldDiffer`] per type
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldDifferFactory;

impl HelperFactory for FieldDifferFactory {
    fn create(&self, type_name: &str) -> Arc<dyn ReflectionHelper> {
        Arc::new(FieldDiffer::new(type_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_modified_field() {
        let differ = FieldDiffer::new("Widget");
        let old = Value::bean([("color", Value::from("red")), ("size", 3.into())]);
        let new = Value::bean([("color", Value::from("blue")), ("size", 3.into())]);

        let changes = differ.diff(&old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0], PropertyChange::modified("color", "red", "blue"));
    }

    #[test]
    fn test_diff_added_and_removed_fields() {
        let differ = FieldDiffer::new("Server");
        let old = Value::bean([("host", Value::from("a")), ("legacy", true.into())]);
        let new = Value::bean([("host", Value::from("a")), ("port", 80.into())]);

        let changes = differ.diff(&old, &new).unwrap();
        assert_eq!(
            changes,
            vec![
                PropertyChange::new("legacy", Some(Value::Bool(true)), None),
                PropertyChange::new("port", None, Some(Value::Int(80))),
            ]
        );
    }

    #[test]
    fn test_diff_identical_beans() {
        let differ = FieldDiffer::new("Server");
        let bean = Value::bean([("host", "a")]);
        assert!(differ.diff(&bean, &bean.clone()).unwrap().is_empty());
    }

    #[test]
    fn test_diff_rejects_non_map_beans() {
        let differ = FieldDiffer::new("Server");
        let result = differ.diff(&Value::Int(1), &Value::bean([("a", 1)]));
        assert_eq!(result, Err(Error::NotABean { found: "int" }));
    }

    #[test]
    fn test_diff_after_dispose_fails() {
        let differ = FieldDiffer::new("Server");
        assert!(!differ.is_disposed());
        differ.dispose();
        assert!(differ.is_disposed());

        let bean = Value::bean([("a", 1)]);
        assert!(matches!(
            differ.diff(&bean, &bean),
            Err(Error::HelperDisposed { .. })
        ));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |name: &str| -> Arc<dyn ReflectionHelper> {
            Arc::new(FieldDiffer::new(format!("custom:{}", name)))
        };
        let helper = factory.create("Widget");
        assert!(!helper.is_disposed());
    }

    #[test]
    fn test_property_change_display() {
        let change = PropertyChange::modified("color", "red", "blue");
        assert_eq!(change.to_string(), "color: \"red\" -> \"blue\"");

        let added = PropertyChange::new("port", None, Some(Value::Int(80)));
        assert_eq!(added.to_string(), "port: <unset> -> 80");
    }
}
