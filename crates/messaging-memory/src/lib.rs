//! In-memory messaging driver.
//!
//! Registers the `memory` driver type with a [`DriverRegistry`]. Its
//! transaction backend keeps half-messages in process and rechecks them on a
//! timer, which makes it suitable for tests and single-process deployments.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod access_point;
mod backend;

pub use access_point::MemoryAccessPoint;
pub use backend::{CheckPass, MemoryBackendOptions, MemoryTransactionBackend};

use std::sync::Arc;

use oms_access_point::DriverRegistry;
use oms_messaging::MessagingAccessPoint;

/// Driver type token of this driver in access point URIs.
pub const DRIVER_TYPE: &str = "memory";

/// Registers the driver; every resolved access point gets its own backend.
pub fn register(registry: &DriverRegistry) {
    registry.register_driver(DRIVER_TYPE, |attributes| {
        let access_point: Arc<dyn MessagingAccessPoint> =
            Arc::new(MemoryAccessPoint::new(attributes)?);
        Ok(access_point)
    });
}

/// Registers the driver so that every resolved access point shares `backend`.
pub fn register_shared(registry: &DriverRegistry, backend: MemoryTransactionBackend) {
    registry.register_driver(DRIVER_TYPE, move |attributes| {
        let access_point: Arc<dyn MessagingAccessPoint> = Arc::new(
            MemoryAccessPoint::with_backend(attributes, backend.clone())?,
        );
        Ok(access_point)
    });
}
