use std::num::NonZeroUsize;
use std::time::Duration;

use oms_messaging::{KeyValue, keys};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where message ids come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageIdAssignment {
    /// The producer generates a UUID before the half-message is sent.
    #[default]
    Client,

    /// The backend assigns the id when it stores the half-message.
    Server,
}

/// Transaction coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionCoordinatorOptions {
    /// Capacity of the channel recheck requests arrive on.
    pub check_channel_capacity: usize,

    /// How many finished transactions are remembered for idempotent rechecks.
    pub completed_capacity: NonZeroUsize,

    /// How many times a commit or rollback is re-sent after the first failure.
    pub decision_retry_attempts: u32,

    /// Delay between decision re-sends.
    pub decision_retry_delay: Duration,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,

    /// How long a local execution or check may take before it counts as unknown.
    pub local_execution_timeout: Duration,

    /// Where message ids come from.
    pub message_id_assignment: MessageIdAssignment,
}

impl Default for TransactionCoordinatorOptions {
    fn default() -> Self {
        Self {
            check_channel_capacity: 1024,
            completed_capacity: NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN),
            decision_retry_attempts: 3,
            decision_retry_delay: Duration::from_millis(500),
            event_capacity: 256,
            local_execution_timeout: Duration::from_secs(3),
            message_id_assignment: MessageIdAssignment::Client,
        }
    }
}

impl TransactionCoordinatorOptions {
    /// Defaults overridden by the well-known transaction keys found in `properties`.
    ///
    /// Unusable values are logged and ignored.
    #[must_use]
    pub fn from_properties(properties: &KeyValue) -> Self {
        let mut options = Self::default();

        if let Some(millis) = properties.get_long(keys::TRANSACTION_EXECUTION_TIMEOUT) {
            match u64::try_from(millis) {
                Ok(millis) => options.local_execution_timeout = Duration::from_millis(millis),
                Err(_) => warn!("ignoring negative {}", keys::TRANSACTION_EXECUTION_TIMEOUT),
            }
        }

        if let Some(times) = properties.get_int(keys::TRANSACTION_DECISION_RETRY_TIMES) {
            match u32::try_from(times) {
                Ok(times) => options.decision_retry_attempts = times,
                Err(_) => warn!("ignoring negative {}", keys::TRANSACTION_DECISION_RETRY_TIMES),
            }
        }

        match properties.get_string(keys::MESSAGE_ID_ASSIGNMENT) {
            Some("client") => options.message_id_assignment = MessageIdAssignment::Client,
            Some("server") => options.message_id_assignment = MessageIdAssignment::Server,
            Some(other) => warn!(
                "ignoring unknown {} value {other}",
                keys::MESSAGE_ID_ASSIGNMENT
            ),
            None => {}
        }

        options
    }
}
