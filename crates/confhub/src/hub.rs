//! Hub - Central coordinator owning the current snapshot
//!
//! The hub holds exactly one current [`Snapshot`] and hands out
//! [`WritableDatabase`]s based on it. Publishing a transaction replaces the
//! current snapshot by reference; readers holding the previous snapshot keep
//! a consistent view.
//!
//! ## Locking
//!
//! The hub lock guards the current snapshot reference and the
//! in-transaction counter. It is held only for lookups and reference swaps,
//! never while listener code runs, so readers are not held up by slow
//! listeners. The commit protocol itself lives in [`crate::commit`].

use crate::config::HubConfig;
use crate::instance::Instance;
use crate::listener::{ListenerRegistry, ListenerSet};
use crate::revision::next_revision;
use crate::snapshot::Snapshot;
use crate::transaction::WritableDatabase;
use crate::types::{Type, TypeSet};
use confhub_core::{FieldDifferFactory, HelperFactory};
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) struct HubState {
    /// The published snapshot
    pub(crate) current: Arc<Snapshot>,
    /// Number of transactions between prepare and activate/rollback (0 or 1)
    pub(crate) in_transaction: usize,
}

pub(crate) struct HubShared {
    pub(crate) state: Mutex<HubState>,
    pub(crate) listeners: Arc<dyn ListenerRegistry>,
    pub(crate) helpers: Arc<dyn HelperFactory>,
    pub(crate) config: HubConfig,
}

/// Versioned, transactional store of typed bean instances
///
/// `Hub` is a handle: clones share the same store.
///
/// ```
/// use confhub::Hub;
/// use confhub_core::Value;
///
/// let hub = Hub::new();
/// let r0 = hub.revision();
///
/// let txn = hub.new_transaction();
/// txn.find_or_add_type("Widget")
///     .unwrap()
///     .add_instance("w1", Value::bean([("color", "red")]), None)
///     .unwrap();
/// txn.commit(None).unwrap();
///
/// assert!(hub.revision() > r0);
/// assert!(hub.get_instance("Widget", "w1").is_some());
/// ```
#[derive(Clone)]
pub struct Hub {
    pub(crate) shared: Arc<HubShared>,
}

impl Hub {
    /// Create a hub with default configuration, no listeners and the
    /// field-by-field differ
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a hub with a specific configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a hub
    pub fn builder() -> HubBuilder {
        HubBuilder::default()
    }

    /// The hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// The registry consulted at the start of every prepare
    pub fn listener_registry(&self) -> &Arc<dyn ListenerRegistry> {
        &self.shared.listeners
    }

    pub(crate) fn helper_factory(&self) -> &Arc<dyn HelperFactory> {
        &self.shared.helpers
    }

    pub(crate) fn is_same(&self, other: &Hub) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ========================================================================
    // Read API
    // ========================================================================

    /// The current snapshot
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.state.lock().current)
    }

    /// Revision of the current snapshot
    pub fn revision(&self) -> u64 {
        self.shared.state.lock().current.revision()
    }

    /// Get a type from the current snapshot
    pub fn get_type(&self, name: &str) -> Option<Arc<Type>> {
        self.current_snapshot().get_type(name).cloned()
    }

    /// Get an instance from the current snapshot
    pub fn get_instance(&self, type_name: &str, key: &str) -> Option<Arc<Instance>> {
        self.current_snapshot()
            .get_instance(type_name, key)
            .cloned()
    }

    /// Human-readable listing of the current snapshot
    pub fn dump_as_string(&self) -> String {
        self.current_snapshot().dump_as_string()
    }

    /// Whether a transaction is between prepare and activate/rollback
    pub fn in_transaction(&self) -> bool {
        self.shared.state.lock().in_transaction > 0
    }

    // ========================================================================
    // Write API
    // ========================================================================

    /// Open a transaction against the current snapshot
    ///
    /// The transaction's types are writable copies that share instance maps
    /// (and instances) with the snapshot until first written to.
    pub fn new_transaction(&self) -> WritableDatabase {
        let base = self.current_snapshot();
        tracing::trace!(
            hub = %self.shared.config.name,
            base_revision = base.revision(),
            "opened transaction"
        );
        WritableDatabase::new(self.clone(), base)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Hub")
            .field("name", &self.shared.config.name)
            .field("revision", &state.current.revision())
            .field("types", &state.current.types().len())
            .field("in_transaction", &state.in_transaction)
            .finish()
    }
}

/// Builder for [`Hub`]
///
/// ```
/// use confhub::{Hub, HubConfig, ListenerSet};
/// use std::sync::Arc;
///
/// let listeners = Arc::new(ListenerSet::new());
/// let hub = Hub::builder()
///     .config(HubConfig::named("primary"))
///     .listeners(listeners)
///     .build();
/// assert_eq!(hub.config().name, "primary");
/// ```
#[derive(Default)]
pub struct HubBuilder {
    config: HubConfig,
    listeners: Option<Arc<dyn ListenerRegistry>>,
    helpers: Option<Arc<dyn HelperFactory>>,
}

impl HubBuilder {
    /// Use this configuration
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this listener registry (default: an empty [`ListenerSet`])
    pub fn listeners(mut self, listeners: Arc<dyn ListenerRegistry>) -> Self {
        self.listeners = Some(listeners);
        self
    }

    /// Use this factory for the reflection helpers of new types
    /// (default: [`FieldDifferFactory`])
    pub fn helpers(mut self, helpers: Arc<dyn HelperFactory>) -> Self {
        self.helpers = Some(helpers);
        self
    }

    /// Build the hub; its initial snapshot is empty and takes a fresh revision
    pub fn build(self) -> Hub {
        let initial = Arc::new(Snapshot::new(next_revision(), TypeSet::default()));
        tracing::debug!(
            hub = %self.config.name,
            revision = initial.revision(),
            "created hub"
        );

        Hub {
            shared: Arc::new(HubShared {
                state: Mutex::new(HubState {
                    current: initial,
                    in_transaction: 0,
                }),
                listeners: self
                    .listeners
                    .unwrap_or_else(|| Arc::new(ListenerSet::new())),
                helpers: self.helpers.unwrap_or_else(|| Arc::new(FieldDifferFactory)),
                config: self.config,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confhub_core::{FieldDiffer, ReflectionHelper, Value};

    #[test]
    fn test_hub_creation() {
        let hub = Hub::new();
        assert!(hub.current_snapshot().get_all_types().is_empty());
        assert!(!hub.in_transaction());
        assert_eq!(hub.config().name, "hub");
    }

    #[test]
    fn test_each_hub_starts_at_fresh_revision() {
        let a = Hub::new();
        let b = Hub::new();
        assert_ne!(a.revision(), b.revision());
    }

    #[test]
    fn test_current_snapshot_is_shared_until_commit() {
        let hub = Hub::new();
        let first = hub.current_snapshot();
        let second = hub.current_snapshot();
        assert!(Arc::ptr_eq(&first, &second));

        hub.new_transaction().commit(None).unwrap();
        assert!(!Arc::ptr_eq(&first, &hub.current_snapshot()));
    }

    #[test]
    fn test_clones_share_store() {
        let hub = Hub::new();
        let other = hub.clone();
        let txn = other.new_transaction();
        txn.find_or_add_type("Widget").unwrap();
        txn.commit(None).unwrap();

        assert!(hub.get_type("Widget").is_some());
        assert!(hub.is_same(&other));
        assert!(!hub.is_same(&Hub::new()));
    }

    #[test]
    fn test_custom_helper_factory() {
        let factory = |name: &str| -> Arc<dyn ReflectionHelper> {
            Arc::new(FieldDiffer::new(format!("custom-{}", name)))
        };
        let hub = Hub::builder().helpers(Arc::new(factory)).build();

        let txn = hub.new_transaction();
        let widgets = txn.find_or_add_type("Widget").unwrap();
        widgets.add_instance("w1", Value::bean([("a", 1)]), None).unwrap();
        assert!(format!("{:?}", widgets.helper()).contains("custom-Widget"));
    }

    #[test]
    fn test_hub_dump_and_debug() {
        let hub = Hub::with_config(HubConfig::named("dumped"));
        let txn = hub.new_transaction();
        txn.find_or_add_type("Server")
            .unwrap()
            .add_instance("srv1", Value::bean([("port", 80)]), None)
            .unwrap();
        txn.commit(None).unwrap();

        assert!(hub.dump_as_string().contains("Server -> [srv1]"));
        let debug = format!("{:?}", hub);
        assert!(debug.contains("dumped"));
        assert!(debug.contains("types: 1"));
    }
}
