//! Vendor-neutral messaging API shared by access point drivers and producers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Access points are the resolved, vendor-specific entry into a messaging system.
pub mod access_point;

/// Backends persist half-messages and drive transaction rechecks.
pub mod backend;

/// Well-known property and header keys.
pub mod keys;

/// Property bags of primitive values.
pub mod key_value;

/// Messages carry a payload plus headers and user properties.
pub mod message;

/// Results of completed sends.
pub mod send_result;

/// Local transaction callbacks and decisions.
pub mod transaction;

pub use access_point::{AccessPointFactory, DriverError, MessagingAccessPoint};
pub use backend::{BackendError, CheckRequest, HalfMessageReceipt, TransactionBackend};
pub use key_value::{KeyValue, PropertyValue};
pub use message::{Message, MessageError};
pub use send_result::SendResult;
pub use transaction::{
    Decision, LocalTransactionChecker, LocalTransactionError, LocalTransactionExecutor,
    TransactionResolution, TransactionState,
};

/// Version of the messaging specification implemented by this crate.
pub const SPECIFICATION_VERSION: &str = env!("CARGO_PKG_VERSION");
