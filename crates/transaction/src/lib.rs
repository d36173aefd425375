//! Transactional sends over a vendor-neutral transaction backend.
//!
//! A transactional send is a three-phase protocol: the backend durably stores a
//! half-message that consumers cannot see yet, the application's local
//! transaction runs, and its answer either commits or rolls back the
//! half-message. When the answer is unknown the backend later asks the
//! producer to check the local transaction again, through a channel the
//! [`TransactionCoordinator`] serves once started.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod coordinator;
mod error;
mod event;
mod options;
mod record;

pub use coordinator::TransactionCoordinator;
pub use error::{Error, Result};
pub use event::{ResolutionSource, TransactionEvent};
pub use options::{MessageIdAssignment, TransactionCoordinatorOptions};
