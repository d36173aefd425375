use crate::error::{Error, ResolutionCause, Result};
use crate::registry::{DriverRegistry, conventional_implementation_id};
use crate::uri::AccessPointDescriptor;

use std::ops::Deref;
use std::sync::Arc;

use oms_messaging::{KeyValue, MessagingAccessPoint, SPECIFICATION_VERSION, keys};
use semver::Version;
use tracing::{debug, info};

/// A constructed access point together with the URI it was resolved from.
#[derive(Clone, Debug)]
pub struct AccessPointHandle {
    access_point: Arc<dyn MessagingAccessPoint>,
    descriptor: AccessPointDescriptor,
    implementation_id: String,
}

impl AccessPointHandle {
    /// The vendor access point.
    #[must_use]
    pub fn access_point(&self) -> &Arc<dyn MessagingAccessPoint> {
        &self.access_point
    }

    /// The parsed URI.
    #[must_use]
    pub const fn descriptor(&self) -> &AccessPointDescriptor {
        &self.descriptor
    }

    /// The implementation id the access point was built from.
    #[must_use]
    pub fn implementation_id(&self) -> &str {
        &self.implementation_id
    }
}

impl Deref for AccessPointHandle {
    type Target = dyn MessagingAccessPoint;

    fn deref(&self) -> &Self::Target {
        self.access_point.as_ref()
    }
}

/// Binds access point URIs to registered driver implementations.
#[derive(Clone, Debug)]
pub struct AccessPointResolver {
    registry: DriverRegistry,
    specification_version: String,
}

impl AccessPointResolver {
    /// Creates a resolver checking implementations against this crate's specification version.
    #[must_use]
    pub fn new(registry: DriverRegistry) -> Self {
        Self::with_specification_version(registry, SPECIFICATION_VERSION)
    }

    /// Creates a resolver checking implementations against `specification_version`.
    pub fn with_specification_version<V>(registry: DriverRegistry, specification_version: V) -> Self
    where
        V: Into<String>,
    {
        Self {
            registry,
            specification_version: specification_version.into(),
        }
    }

    /// The registry this resolver looks implementations up in.
    #[must_use]
    pub const fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// The specification version implementations are checked against.
    #[must_use]
    pub fn specification_version(&self) -> &str {
        &self.specification_version
    }

    /// Parses `uri` and resolves it.
    ///
    /// # Errors
    ///
    /// See [`AccessPointDescriptor::parse`] and [`Self::resolve`].
    pub fn resolve_uri(&self, uri: &str, properties: &KeyValue) -> Result<AccessPointHandle> {
        let descriptor = AccessPointDescriptor::parse(uri)?;
        self.resolve(descriptor, properties)
    }

    /// Constructs the access point implementation bound to `descriptor`.
    ///
    /// The implementation id is the [`keys::DRIVER_IMPL`] property when present,
    /// otherwise the conventional id for the descriptor's driver type. The
    /// factory receives `properties` with the descriptor's fields injected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverResolutionFailure`] if nothing is registered under
    /// the implementation id or its factory fails, and
    /// [`Error::IncompatibleVersion`] if the constructed implementation targets
    /// a different `MAJOR.MINOR` specification.
    pub fn resolve(
        &self,
        descriptor: AccessPointDescriptor,
        properties: &KeyValue,
    ) -> Result<AccessPointHandle> {
        let driver = descriptor.driver_type().to_string();
        let implementation_id = properties
            .get_string(keys::DRIVER_IMPL)
            .map_or_else(|| conventional_implementation_id(&driver), str::to_string);

        debug!("resolving {descriptor} with implementation {implementation_id}");

        let resolution_failure = |source| Error::DriverResolutionFailure {
            driver: driver.clone(),
            implementation: implementation_id.clone(),
            source,
        };

        let factory = self
            .registry
            .get(&implementation_id)
            .ok_or_else(|| resolution_failure(ResolutionCause::NotRegistered))?;

        let mut merged = properties.clone();
        merged.merge(&descriptor.to_properties());

        let access_point =
            factory(merged).map_err(|e| resolution_failure(ResolutionCause::Construction(e)))?;

        let implementation_version = access_point.implementation_version();
        if !is_compatible(&self.specification_version, &implementation_version) {
            return Err(Error::IncompatibleVersion {
                driver,
                implementation: implementation_version,
                specification: self.specification_version.clone(),
            });
        }

        info!("resolved {descriptor} to {implementation_id} ({implementation_version})");

        Ok(AccessPointHandle {
            access_point,
            descriptor,
            implementation_id,
        })
    }
}

/// Whether an implementation version is usable with a specification version.
///
/// Both are `MAJOR.MINOR.PATCH`; only `MAJOR.MINOR` must match. Unparsable
/// versions never match.
#[must_use]
pub fn is_compatible(specification: &str, implementation: &str) -> bool {
    match (Version::parse(specification), Version::parse(implementation)) {
        (Ok(specification), Ok(implementation)) => {
            specification.major == implementation.major
                && specification.minor == implementation.minor
        }
        _ => false,
    }
}
