use oms_messaging::{BackendError, Decision, TransactionState};

/// What produced a transaction's answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The local transaction executor, right after the half-message was stored.
    Execute,

    /// The checker, on a backend recheck.
    Check,
}

/// Out-of-band notifications about transactions.
///
/// Failures after the half-message is stored are never returned to the
/// sender; they surface here and in the logs.
#[derive(Clone, Debug)]
pub enum TransactionEvent {
    /// The half-message was stored and a record created.
    Prepared {
        /// Transaction id.
        transaction_id: String,

        /// Message id.
        message_id: String,
    },

    /// A local answer moved the transaction to a new state.
    Resolved {
        /// Transaction id.
        transaction_id: String,

        /// The state reached.
        state: TransactionState,

        /// Where the answer came from.
        source: ResolutionSource,
    },

    /// The local answer was missing or ambiguous; the transaction awaits a recheck.
    Ambiguous {
        /// Transaction id.
        transaction_id: String,

        /// Why the answer was ambiguous.
        reason: String,
    },

    /// The backend acknowledged a decision; the record was released.
    DecisionDelivered {
        /// Transaction id.
        transaction_id: String,

        /// The delivered decision.
        decision: Decision,
    },

    /// Every attempt to deliver a decision failed. The local decision stands.
    DecisionDeliveryFailed {
        /// Transaction id.
        transaction_id: String,

        /// The undelivered decision.
        decision: Decision,

        /// Number of attempts made.
        attempts: u32,

        /// The last backend error.
        error: BackendError,
    },

    /// An unknown transaction was dropped from tracking by age.
    Expired {
        /// Transaction id.
        transaction_id: String,
    },
}

impl TransactionEvent {
    /// The transaction the event is about.
    #[must_use]
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Prepared { transaction_id, .. }
            | Self::Resolved { transaction_id, .. }
            | Self::Ambiguous { transaction_id, .. }
            | Self::DecisionDelivered { transaction_id, .. }
            | Self::DecisionDeliveryFailed { transaction_id, .. }
            | Self::Expired { transaction_id } => transaction_id,
        }
    }
}
