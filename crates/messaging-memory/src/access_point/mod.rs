use crate::backend::{MemoryBackendOptions, MemoryTransactionBackend};

use std::sync::Arc;

use oms_messaging::{DriverError, KeyValue, MessagingAccessPoint, TransactionBackend, keys};

/// Access point of the in-memory driver.
#[derive(Clone, Debug)]
pub struct MemoryAccessPoint {
    attributes: KeyValue,
    backend: MemoryTransactionBackend,
}

impl MemoryAccessPoint {
    /// Creates an access point with a fresh backend configured from `attributes`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingProperty`] if `attributes` has no
    /// access point list.
    pub fn new(attributes: KeyValue) -> Result<Self, DriverError> {
        let backend = MemoryTransactionBackend::new(MemoryBackendOptions::from_properties(
            &attributes,
        ));

        Self::with_backend(attributes, backend)
    }

    /// Creates an access point over an existing backend.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingProperty`] if `attributes` has no
    /// access point list.
    pub fn with_backend(
        attributes: KeyValue,
        backend: MemoryTransactionBackend,
    ) -> Result<Self, DriverError> {
        match attributes.get_string(keys::ACCESS_POINTS) {
            Some(hosts) if !hosts.is_empty() => {}
            _ => return Err(DriverError::MissingProperty(keys::ACCESS_POINTS.to_string())),
        }

        Ok(Self {
            attributes,
            backend,
        })
    }

    /// The concrete backend, for inspecting committed messages.
    #[must_use]
    pub const fn backend(&self) -> &MemoryTransactionBackend {
        &self.backend
    }
}

impl MessagingAccessPoint for MemoryAccessPoint {
    fn implementation_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn attributes(&self) -> &KeyValue {
        &self.attributes
    }

    fn transaction_backend(&self) -> Result<Arc<dyn TransactionBackend>, DriverError> {
        Ok(Arc::new(self.backend.clone()))
    }
}
