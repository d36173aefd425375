use crate::backend::TransactionBackend;
use crate::key_value::KeyValue;

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

/// Errors a driver may raise while constructing or using an access point.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    /// A required property was not supplied.
    #[error("missing property: {0}")]
    MissingProperty(String),

    /// A property was present but unusable.
    #[error("invalid property {key}: {reason}")]
    InvalidProperty {
        /// Offending key.
        key: String,

        /// Why it was rejected.
        reason: String,
    },

    /// The driver does not provide the requested capability.
    #[error("unsupported by driver: {0}")]
    Unsupported(String),
}

/// A constructed, vendor-specific messaging access point.
pub trait MessagingAccessPoint
where
    Self: Debug + Send + Sync + 'static,
{
    /// Version of the specification the implementation was built against.
    fn implementation_version(&self) -> String;

    /// The property bag the access point was constructed with.
    fn attributes(&self) -> &KeyValue;

    /// The backend used by transactional producers created from this access point.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] if the driver has no transaction support.
    fn transaction_backend(&self) -> Result<Arc<dyn TransactionBackend>, DriverError>;
}

/// Constructs an access point from its merged property bag.
pub type AccessPointFactory =
    Arc<dyn Fn(KeyValue) -> Result<Arc<dyn MessagingAccessPoint>, DriverError> + Send + Sync>;
