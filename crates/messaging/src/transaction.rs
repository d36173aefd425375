use crate::message::Message;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by application-supplied local transaction callbacks.
#[derive(Clone, Debug, Error)]
#[error("local transaction failed: {0}")]
pub struct LocalTransactionError(pub String);

impl LocalTransactionError {
    /// Creates an error from any displayable reason.
    pub fn new<R>(reason: R) -> Self
    where
        R: fmt::Display,
    {
        Self(reason.to_string())
    }
}

/// The answer of a local transaction execution or check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionResolution {
    /// Expose the message to consumers.
    Commit,

    /// Discard the half-message.
    Rollback,

    /// The outcome cannot be determined yet.
    Unknown,
}

impl TransactionResolution {
    /// The decision this resolution carries, if it is final.
    #[must_use]
    pub const fn decision(self) -> Option<Decision> {
        match self {
            Self::Commit => Some(Decision::Commit),
            Self::Rollback => Some(Decision::Rollback),
            Self::Unknown => None,
        }
    }
}

/// A final decision sent to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Make the half-message visible.
    Commit,

    /// Drop the half-message.
    Rollback,
}

impl Decision {
    /// The terminal state reached by this decision.
    #[must_use]
    pub const fn terminal_state(self) -> TransactionState {
        match self {
            Self::Commit => TransactionState::Committed,
            Self::Rollback => TransactionState::RolledBack,
        }
    }
}

impl From<Decision> for TransactionResolution {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => Self::Commit,
            Decision::Rollback => Self::Rollback,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => f.write_str("commit"),
            Self::Rollback => f.write_str("rollback"),
        }
    }
}

/// Lifecycle state of a transactional message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// The half-message is stored; the local transaction has not answered yet.
    Prepared,

    /// Committed. Terminal.
    Committed,

    /// Rolled back. Terminal.
    RolledBack,

    /// Waiting for a recheck to resolve the outcome.
    Unknown,
}

impl TransactionState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Prepared | Self::Unknown => !matches!(next, Self::Prepared),
            Self::Committed | Self::RolledBack => false,
        }
    }

    /// The decision recorded by a terminal state.
    #[must_use]
    pub const fn decision(self) -> Option<Decision> {
        match self {
            Self::Committed => Some(Decision::Commit),
            Self::RolledBack => Some(Decision::Rollback),
            Self::Prepared | Self::Unknown => None,
        }
    }
}

/// Runs the application's local transaction once its half-message is stored.
#[async_trait]
pub trait LocalTransactionExecutor
where
    Self: Send + Sync + 'static,
{
    /// Executes the local transaction bound to `message`.
    async fn execute(
        &self,
        message: &Message,
        arg: Option<Bytes>,
    ) -> Result<TransactionResolution, LocalTransactionError>;
}

/// Re-determines the outcome of a local transaction on backend request.
#[async_trait]
pub trait LocalTransactionChecker
where
    Self: Send + Sync + 'static,
{
    /// Checks the local transaction bound to `message`.
    async fn check(&self, message: &Message)
    -> Result<TransactionResolution, LocalTransactionError>;
}
