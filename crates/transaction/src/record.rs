use std::fmt;
use std::sync::Arc;

use oms_messaging::{LocalTransactionExecutor, Message, TransactionState};
use tokio::time::Instant;

/// Per-transaction state owned by the coordinator.
pub(crate) struct TransactionRecord {
    pub(crate) check_count: u32,
    pub(crate) created_at: Instant,
    pub(crate) executor: Option<Arc<dyn LocalTransactionExecutor>>,
    pub(crate) message: Message,
    state: TransactionState,
    pub(crate) transaction_id: String,
}

impl TransactionRecord {
    pub(crate) fn new(
        transaction_id: String,
        message: Message,
        executor: Arc<dyn LocalTransactionExecutor>,
    ) -> Self {
        Self {
            check_count: 0,
            created_at: Instant::now(),
            executor: Some(executor),
            message,
            state: TransactionState::Prepared,
            transaction_id,
        }
    }

    pub(crate) const fn state(&self) -> TransactionState {
        self.state
    }

    /// Moves to `next` if the transition is legal. Drops the executor once
    /// the record leaves `Prepared`.
    pub(crate) fn transition(&mut self, next: TransactionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }

        self.state = next;
        self.executor = None;
        true
    }
}

impl fmt::Debug for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRecord")
            .field("transaction_id", &self.transaction_id)
            .field("state", &self.state)
            .field("check_count", &self.check_count)
            .field("age", &self.created_at.elapsed())
            .finish_non_exhaustive()
    }
}
