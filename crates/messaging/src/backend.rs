use crate::key_value::KeyValue;
use crate::message::Message;
use crate::transaction::{Decision, TransactionResolution};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors reported by a transaction backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or is not accepting work.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend refused the message or the decision.
    #[error("message rejected: {0}")]
    MessageRejected(String),
}

/// Acknowledgment of a durably stored half-message.
#[derive(Clone, Debug, PartialEq)]
pub struct HalfMessageReceipt {
    /// Message id assigned by the backend, when it assigns ids.
    pub message_id: Option<String>,

    /// Vendor extras, passed through to the send result.
    pub properties: KeyValue,

    /// Transaction id for the half-message. Unique per backend.
    pub transaction_id: String,
}

/// A backend-initiated request to re-determine a transaction's outcome.
#[derive(Debug)]
pub struct CheckRequest {
    /// The half-message being rechecked. Carries its transaction id.
    pub message: Message,

    /// Where the answer goes.
    pub reply: oneshot::Sender<TransactionResolution>,
}

/// The broker side of the half-message protocol.
#[async_trait]
pub trait TransactionBackend
where
    Self: Send + Sync + 'static,
{
    /// Durably stores `message` without exposing it to consumers.
    async fn send_half_message(&self, message: &Message)
    -> Result<HalfMessageReceipt, BackendError>;

    /// Commits or rolls back a stored half-message.
    async fn notify_decision(
        &self,
        transaction_id: &str,
        decision: Decision,
    ) -> Result<(), BackendError>;

    /// Hands the backend the channel on which it delivers recheck requests.
    ///
    /// Replaces any previously attached channel.
    fn attach_check_channel(&self, sender: mpsc::Sender<CheckRequest>);
}
