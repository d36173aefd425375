use crate::key_value::KeyValue;
use crate::transaction::TransactionState;

/// The outcome of a completed send call.
#[derive(Clone, Debug)]
pub struct SendResult {
    message_id: String,
    properties: KeyValue,
    transaction_id: Option<String>,
    transaction_state: Option<TransactionState>,
}

impl SendResult {
    /// Result of a transactional send, with the local state observed on return.
    pub fn transactional<I, T>(
        message_id: I,
        transaction_id: T,
        transaction_state: TransactionState,
        properties: KeyValue,
    ) -> Self
    where
        I: Into<String>,
        T: Into<String>,
    {
        Self {
            message_id: message_id.into(),
            properties,
            transaction_id: Some(transaction_id.into()),
            transaction_state: Some(transaction_state),
        }
    }

    /// The id of the sent message.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Vendor-specific extras.
    #[must_use]
    pub const fn properties(&self) -> &KeyValue {
        &self.properties
    }

    /// The transaction id for transactional sends.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// The local transaction state when the send returned.
    #[must_use]
    pub const fn transaction_state(&self) -> Option<TransactionState> {
        self.transaction_state
    }
}
