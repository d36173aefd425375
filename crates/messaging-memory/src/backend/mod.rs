mod options;

pub use options::MemoryBackendOptions;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use oms_messaging::{
    BackendError, CheckRequest, Decision, HalfMessageReceipt, KeyValue, Message,
    TransactionBackend, TransactionResolution, keys::headers,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct HalfMessage {
    check_times: u32,
    message: Message,
    stored_at: Instant,
}

/// Outcome of one recheck pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckPass {
    /// Half-messages a check request was sent for.
    pub checked: usize,

    /// Half-messages committed or rolled back by the answers.
    pub resolved: usize,

    /// Half-messages dropped after too many unknown answers.
    pub discarded: usize,
}

#[derive(Debug)]
struct Inner {
    check_sender: parking_lot::Mutex<Option<mpsc::Sender<CheckRequest>>>,
    checker_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    committed: parking_lot::Mutex<HashMap<String, Vec<Message>>>,
    decisions: parking_lot::Mutex<Vec<(String, Decision)>>,
    failing_decisions: AtomicU32,
    failing_sends: AtomicU32,
    half_messages: DashMap<String, HalfMessage>,
    options: MemoryBackendOptions,
    rejected_destinations: DashSet<String>,
    shutdown: CancellationToken,
}

/// An in-process transaction backend.
///
/// Stores half-messages in memory, exposes committed messages per
/// destination, and rechecks undecided half-messages on its own timer once
/// [`Self::start_checker`] is called.
#[derive(Clone, Debug)]
pub struct MemoryTransactionBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryTransactionBackend {
    fn default() -> Self {
        Self::new(MemoryBackendOptions::default())
    }
}

impl MemoryTransactionBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new(options: MemoryBackendOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                check_sender: parking_lot::Mutex::new(None),
                checker_task: parking_lot::Mutex::new(None),
                committed: parking_lot::Mutex::new(HashMap::new()),
                decisions: parking_lot::Mutex::new(Vec::new()),
                failing_decisions: AtomicU32::new(0),
                failing_sends: AtomicU32::new(0),
                half_messages: DashMap::new(),
                options,
                rejected_destinations: DashSet::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The backend's options.
    #[must_use]
    pub fn options(&self) -> &MemoryBackendOptions {
        &self.inner.options
    }

    /// Messages committed to `destination`, in commit order.
    #[must_use]
    pub fn committed(&self, destination: &str) -> Vec<Message> {
        self.inner
            .committed
            .lock()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Every decision the backend accepted, in arrival order.
    #[must_use]
    pub fn decisions(&self) -> Vec<(String, Decision)> {
        self.inner.decisions.lock().clone()
    }

    /// Whether a half-message is still waiting for a decision.
    #[must_use]
    pub fn is_pending(&self, transaction_id: &str) -> bool {
        self.inner.half_messages.contains_key(transaction_id)
    }

    /// Number of half-messages waiting for a decision.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.half_messages.len()
    }

    /// Makes the next `count` half-message sends fail as unavailable.
    pub fn fail_next_sends(&self, count: u32) {
        self.inner.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` decision deliveries fail as unavailable.
    pub fn fail_next_decisions(&self, count: u32) {
        self.inner.failing_decisions.store(count, Ordering::SeqCst);
    }

    /// Rejects every half-message sent to `destination`.
    pub fn reject_destination<D>(&self, destination: D)
    where
        D: Into<String>,
    {
        self.inner.rejected_destinations.insert(destination.into());
    }

    /// Starts rechecking half-messages every `check_interval`.
    ///
    /// Does nothing if the checker is already running.
    pub fn start_checker(&self) {
        let mut task = self.inner.checker_task.lock();
        if task.is_some() {
            return;
        }

        let backend = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.options.check_interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let pass = backend.check_pending().await;
                        if pass.checked > 0 {
                            debug!("recheck pass: {pass:?}");
                        }
                    }
                }
            }
        }));
        drop(task);

        info!("memory backend checker started");
    }

    /// Stops the recheck timer and waits for it to exit.
    pub async fn stop_checker(&self) {
        let task = self.inner.checker_task.lock().take();
        if let Some(task) = task {
            self.inner.shutdown.cancel();
            if let Err(e) = task.await {
                warn!("memory backend checker failed: {e}");
            }
        }
    }

    /// Runs one recheck pass over half-messages older than the immunity window.
    ///
    /// A half-message that already got `max_check_times` unknown answers is
    /// discarded instead of checked again.
    pub async fn check_pending(&self) -> CheckPass {
        let sender = self.inner.check_sender.lock().clone();
        let Some(sender) = sender else {
            debug!("no check channel attached, skipping recheck");
            return CheckPass::default();
        };

        let immunity = self.inner.options.check_immunity;
        let max_check_times = self.inner.options.max_check_times;
        let mut pass = CheckPass::default();
        let mut due = Vec::new();

        for mut entry in self.inner.half_messages.iter_mut() {
            if entry.stored_at.elapsed() < immunity {
                continue;
            }

            if entry.check_times >= max_check_times {
                due.push((entry.key().clone(), None));
                continue;
            }

            entry.check_times = entry.check_times.saturating_add(1);
            let mut message = entry.message.clone();
            message
                .properties_mut()
                .put(headers::CHECK_TIMES, i64::from(entry.check_times));
            due.push((entry.key().clone(), Some(message)));
        }

        let mut requests = Vec::new();
        for (transaction_id, message) in due {
            let Some(message) = message else {
                if self.inner.half_messages.remove(&transaction_id).is_some() {
                    warn!(
                        "discarding transaction {transaction_id} after {max_check_times} unknown checks"
                    );
                    pass.discarded = pass.discarded.saturating_add(1);
                }
                continue;
            };

            let (reply, answer) = oneshot::channel();
            if sender.send(CheckRequest { message, reply }).await.is_err() {
                debug!("check channel closed during recheck");
                break;
            }

            pass.checked = pass.checked.saturating_add(1);
            requests.push(async move { (transaction_id, answer.await) });
        }

        for (transaction_id, answer) in join_all(requests).await {
            let decision = match answer {
                Ok(TransactionResolution::Commit) => Decision::Commit,
                Ok(TransactionResolution::Rollback) => Decision::Rollback,
                Ok(TransactionResolution::Unknown) => continue,
                Err(_) => {
                    debug!("no answer for transaction {transaction_id}");
                    continue;
                }
            };

            if self.apply_decision(&transaction_id, decision).is_ok() {
                pass.resolved = pass.resolved.saturating_add(1);
            }
        }

        pass
    }

    fn apply_decision(&self, transaction_id: &str, decision: Decision) -> Result<(), BackendError> {
        let (_, half) = self
            .inner
            .half_messages
            .remove(transaction_id)
            .ok_or_else(|| {
                BackendError::MessageRejected(format!("unknown transaction {transaction_id}"))
            })?;

        self.inner
            .decisions
            .lock()
            .push((transaction_id.to_string(), decision));

        match decision {
            Decision::Commit => {
                debug!("committing transaction {transaction_id}");
                self.inner
                    .committed
                    .lock()
                    .entry(half.message.destination().to_string())
                    .or_default()
                    .push(half.message);
            }
            Decision::Rollback => debug!("rolling back transaction {transaction_id}"),
        }

        Ok(())
    }
}

/// Decrements `counter` if it is positive; returns whether it was.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TransactionBackend for MemoryTransactionBackend {
    async fn send_half_message(
        &self,
        message: &Message,
    ) -> Result<HalfMessageReceipt, BackendError> {
        if take_failure(&self.inner.failing_sends) {
            return Err(BackendError::BackendUnavailable(
                "injected send failure".to_string(),
            ));
        }

        if self
            .inner
            .rejected_destinations
            .contains(message.destination())
        {
            return Err(BackendError::MessageRejected(format!(
                "destination {} does not accept transactional messages",
                message.destination()
            )));
        }

        let transaction_id = Uuid::new_v4().to_string();
        let mut stored = message.clone();
        stored
            .assign_transaction_id(transaction_id.as_str())
            .map_err(|e| BackendError::MessageRejected(e.to_string()))?;

        let assigned_id = match stored.message_id() {
            Some(_) => None,
            None => {
                let id = Uuid::new_v4().to_string();
                stored
                    .assign_message_id(id.as_str())
                    .map_err(|e| BackendError::MessageRejected(e.to_string()))?;
                Some(id)
            }
        };

        debug!("stored half-message for transaction {transaction_id}");

        self.inner.half_messages.insert(
            transaction_id.clone(),
            HalfMessage {
                check_times: 0,
                message: stored,
                stored_at: Instant::now(),
            },
        );

        Ok(HalfMessageReceipt {
            message_id: assigned_id,
            properties: KeyValue::new(),
            transaction_id,
        })
    }

    async fn notify_decision(
        &self,
        transaction_id: &str,
        decision: Decision,
    ) -> Result<(), BackendError> {
        if take_failure(&self.inner.failing_decisions) {
            return Err(BackendError::BackendUnavailable(
                "injected decision failure".to_string(),
            ));
        }

        self.apply_decision(transaction_id, decision)
    }

    fn attach_check_channel(&self, sender: mpsc::Sender<CheckRequest>) {
        *self.inner.check_sender.lock() = Some(sender);
    }
}
