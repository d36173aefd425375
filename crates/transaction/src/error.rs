use std::time::Duration;

use oms_messaging::{BackendError, DriverError, LocalTransactionError, MessageError};
use thiserror::Error;

/// Errors returned to callers of the transaction coordinator.
#[derive(Debug, Error)]
pub enum Error {
    /// The check dispatcher is already running.
    #[error("coordinator already started")]
    AlreadyStarted,

    /// The access point could not provide a transaction backend.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The message cannot be sent as given.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The check dispatcher is not running.
    #[error("coordinator not started")]
    NotStarted,

    /// The half-message could not be stored. No transaction was created.
    #[error("transaction prepare failed: {0}")]
    TransactionPrepareFailure(#[source] BackendError),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a local transaction answer was treated as unknown.
///
/// Never returned to callers; reported through logs and events only.
#[derive(Debug, Error)]
pub(crate) enum LocalExecutionAmbiguous {
    #[error(transparent)]
    Failed(#[from] LocalTransactionError),

    #[error("local transaction panicked")]
    Panicked,

    #[error("no answer within {0:?}")]
    TimedOut(Duration),
}
