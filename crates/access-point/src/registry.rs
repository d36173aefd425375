use std::sync::Arc;

use dashmap::DashMap;
use oms_messaging::{AccessPointFactory, DriverError, KeyValue, MessagingAccessPoint};
use tracing::{debug, warn};

/// The implementation id a driver type maps to when no override is given.
#[must_use]
pub fn conventional_implementation_id(driver_type: &str) -> String {
    format!("io.openmessaging.{driver_type}.MessagingAccessPointImpl")
}

/// Maps implementation ids to access point factories.
///
/// Populated once at startup by each available driver and then shared
/// read-mostly by every resolver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: Arc<DashMap<String, AccessPointFactory>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under an explicit implementation id.
    ///
    /// Replaces, and returns, any factory already registered under that id.
    pub fn register<I, F>(&self, implementation_id: I, factory: F) -> Option<AccessPointFactory>
    where
        I: Into<String>,
        F: Fn(KeyValue) -> Result<Arc<dyn MessagingAccessPoint>, DriverError>
            + Send
            + Sync
            + 'static,
    {
        let implementation_id = implementation_id.into();
        debug!("registering access point implementation {implementation_id}");

        let previous = self
            .factories
            .insert(implementation_id.clone(), Arc::new(factory));

        if previous.is_some() {
            warn!("replaced access point implementation {implementation_id}");
        }

        previous
    }

    /// Registers `factory` under the conventional id for `driver_type`.
    pub fn register_driver<F>(&self, driver_type: &str, factory: F) -> Option<AccessPointFactory>
    where
        F: Fn(KeyValue) -> Result<Arc<dyn MessagingAccessPoint>, DriverError>
            + Send
            + Sync
            + 'static,
    {
        self.register(conventional_implementation_id(driver_type), factory)
    }

    /// Whether an implementation is registered under `implementation_id`.
    #[must_use]
    pub fn contains(&self, implementation_id: &str) -> bool {
        self.factories.contains_key(implementation_id)
    }

    /// The factory registered under `implementation_id`.
    #[must_use]
    pub fn get(&self, implementation_id: &str) -> Option<AccessPointFactory> {
        self.factories
            .get(implementation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All registered implementation ids, sorted.
    #[must_use]
    pub fn implementation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("implementations", &self.implementation_ids())
            .finish()
    }
}
