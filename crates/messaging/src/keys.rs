//! Literal key names are stable within a deployment; drivers and producers
//! must agree on them.

/// Explicit access point implementation id, bypasses the driver naming convention.
pub const DRIVER_IMPL: &str = "oms.driver.impl";

/// Driver type token taken from the access point URI.
pub const DRIVER: &str = "oms.driver";

/// Comma-joined `host[:port]` list.
pub const ACCESS_POINTS: &str = "oms.access.points";

/// Namespace the access point is bound to.
pub const NAMESPACE: &str = "oms.namespace";

/// Region the access point is bound to.
pub const REGION: &str = "oms.region";

/// Account the access point authenticates as.
pub const ACCOUNT_ID: &str = "oms.account.id";

/// Producer id, used by some drivers to group transactional producers.
pub const PRODUCER_ID: &str = "oms.producer.id";

/// Upper bound on how long a local transaction may run before it is treated as unknown.
pub const TRANSACTION_EXECUTION_TIMEOUT: &str = "oms.transaction.execution.timeout.ms";

/// Minimum age of a half-message before the backend starts rechecking it.
pub const TRANSACTION_CHECK_IMMUNITY_TIME: &str = "oms.transaction.check.immunity.time.ms";

/// Period of the backend's recheck timer.
pub const TRANSACTION_CHECK_INTERVAL: &str = "oms.transaction.check.interval.ms";

/// Number of unknown answers after which the backend gives up on a half-message.
pub const TRANSACTION_CHECK_MAX_TIMES: &str = "oms.transaction.check.max.times";

/// How many times a commit or rollback decision is re-sent before giving up.
pub const TRANSACTION_DECISION_RETRY_TIMES: &str = "oms.transaction.decision.retry.times";

/// Where message ids come from: `client` or `server`.
pub const MESSAGE_ID_ASSIGNMENT: &str = "oms.message.id.assignment";

/// System header keys stamped onto sent messages.
pub mod headers {
    /// Message id header.
    pub const MESSAGE_ID: &str = "MESSAGE_ID";

    /// Transaction id header.
    pub const TRANSACTION_ID: &str = "TRANSACTION_ID";

    /// Destination header.
    pub const DESTINATION: &str = "DESTINATION";

    /// Milliseconds since the unix epoch at which the message was first sent.
    pub const BORN_TIMESTAMP: &str = "BORN_TIMESTAMP";

    /// Number of times the backend has rechecked the transaction.
    pub const CHECK_TIMES: &str = "TRANSACTION_CHECK_TIMES";

    /// Correlates a send with backend checks when the backend assigns message ids.
    pub const SEND_ID: &str = "SEND_ID";
}
