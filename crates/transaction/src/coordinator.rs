use crate::error::{Error, LocalExecutionAmbiguous, Result};
use crate::event::{ResolutionSource, TransactionEvent};
use crate::options::{MessageIdAssignment, TransactionCoordinatorOptions};
use crate::record::TransactionRecord;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lru::LruCache;
use oms_messaging::{
    BackendError, CheckRequest, Decision, KeyValue, LocalTransactionChecker, LocalTransactionError,
    LocalTransactionExecutor, Message, MessageError, MessagingAccessPoint, SendResult,
    TransactionBackend, TransactionResolution, TransactionState, keys::headers,
};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type SharedRecord = Arc<Mutex<TransactionRecord>>;

struct Dispatcher {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

struct Inner {
    backend: Arc<dyn TransactionBackend>,
    checker: Arc<dyn LocalTransactionChecker>,
    completed: parking_lot::Mutex<LruCache<String, TransactionState>>,
    destination_checkers: DashMap<String, Arc<dyn LocalTransactionChecker>>,
    dispatcher: parking_lot::Mutex<Option<Dispatcher>>,
    events: broadcast::Sender<TransactionEvent>,
    /// Sends between phase 1 and record insertion, keyed by message id or send id.
    in_flight: DashMap<String, usize>,
    options: TransactionCoordinatorOptions,
    records: DashMap<String, SharedRecord>,
}

/// Marks a send whose half-message the backend may already check before
/// its record exists. Released on drop.
struct InFlightSend {
    inner: Arc<Inner>,
    key: String,
}

impl InFlightSend {
    fn acquire(inner: &Arc<Inner>, key: &str) -> Self {
        *inner.in_flight.entry(key.to_string()).or_insert(0) += 1;

        Self {
            inner: Arc::clone(inner),
            key: key.to_string(),
        }
    }
}

impl Drop for InFlightSend {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.inner.in_flight.entry(self.key.clone()) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }
}

/// The key a check message is matched against in-flight sends with.
///
/// A send without a client message id is tagged with [`headers::SEND_ID`], which
/// the backend keeps on the half-message even after assigning its own id.
fn send_key(message: &Message) -> Option<&str> {
    message
        .properties()
        .get_string(headers::SEND_ID)
        .or_else(|| message.message_id())
}

/// Drives the half-message protocol for transactional sends.
///
/// A send stores a half-message through the backend, runs the local
/// transaction, and then commits or rolls back. Transactions whose local
/// answer is unknown stay tracked until a backend recheck resolves them
/// through [`Self::check`].
///
/// Cloning is cheap; all clones share the same transaction table.
#[derive(Clone)]
pub struct TransactionCoordinator {
    inner: Arc<Inner>,
}

impl TransactionCoordinator {
    /// Creates a coordinator over `backend`, using `checker` for rechecks.
    #[must_use]
    pub fn new(
        backend: Arc<dyn TransactionBackend>,
        checker: Arc<dyn LocalTransactionChecker>,
        options: TransactionCoordinatorOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                backend,
                checker,
                completed: parking_lot::Mutex::new(LruCache::new(options.completed_capacity)),
                destination_checkers: DashMap::new(),
                dispatcher: parking_lot::Mutex::new(None),
                events,
                in_flight: DashMap::new(),
                options,
                records: DashMap::new(),
            }),
        }
    }

    /// Creates a coordinator over the transaction backend of a resolved access point.
    ///
    /// Options are read from the access point's attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`] if the driver has no transaction support.
    pub fn from_access_point(
        access_point: &dyn MessagingAccessPoint,
        checker: Arc<dyn LocalTransactionChecker>,
    ) -> Result<Self> {
        let backend = access_point.transaction_backend()?;
        let options = TransactionCoordinatorOptions::from_properties(access_point.attributes());

        Ok(Self::new(backend, checker, options))
    }

    /// Uses `checker` instead of the default checker for messages sent to `destination`.
    pub fn register_checker<D>(&self, destination: D, checker: Arc<dyn LocalTransactionChecker>)
    where
        D: Into<String>,
    {
        self.inner
            .destination_checkers
            .insert(destination.into(), checker);
    }

    /// Subscribes to transaction events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TransactionEvent> {
        self.inner.events.subscribe()
    }

    /// Attaches a recheck channel to the backend and starts serving it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the dispatcher is already running.
    pub fn start(&self) -> Result<()> {
        let mut dispatcher = self.inner.dispatcher.lock();
        if dispatcher.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (sender, mut receiver) = mpsc::channel::<CheckRequest>(
            self.inner.options.check_channel_capacity.max(1),
        );
        self.inner.backend.attach_check_channel(sender);

        let coordinator = self.clone();
        let shutdown = CancellationToken::new();
        let cancelled = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    request = receiver.recv() => {
                        let Some(CheckRequest { message, reply }) = request else {
                            debug!("check channel closed");
                            break;
                        };

                        let coordinator = coordinator.clone();
                        tokio::spawn(async move {
                            let resolution = coordinator.check(&message).await;
                            if reply.send(resolution).is_err() {
                                debug!("backend dropped check reply");
                            }
                        });
                    }
                }
            }
        });
        *dispatcher = Some(Dispatcher { handle, shutdown });
        drop(dispatcher);

        info!("transaction coordinator started");

        Ok(())
    }

    /// Stops serving rechecks. The coordinator can be started again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the dispatcher is not running.
    pub async fn shutdown(&self) -> Result<()> {
        let dispatcher = self.inner.dispatcher.lock().take();
        let Some(Dispatcher { handle, shutdown }) = dispatcher else {
            return Err(Error::NotStarted);
        };

        shutdown.cancel();
        if let Err(e) = handle.await {
            error!("check dispatcher failed: {e}");
        }

        info!("transaction coordinator stopped");

        Ok(())
    }

    /// Sends `message` transactionally.
    ///
    /// The half-message is stored first, then `executor` runs once with `arg`.
    /// A commit or rollback answer is delivered to the backend before the call
    /// returns; an unknown answer leaves the transaction for a recheck.
    ///
    /// Only failures to store the half-message are returned. Anything that goes
    /// wrong afterwards is reported through logs and [`TransactionEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionPrepareFailure`] if the backend does not
    /// store the half-message, and [`Error::Message`] if `message` was already
    /// sent in a transaction.
    pub async fn send(
        &self,
        mut message: Message,
        executor: Arc<dyn LocalTransactionExecutor>,
        arg: Option<Bytes>,
    ) -> Result<SendResult> {
        if let Some(transaction_id) = message.transaction_id() {
            return Err(Error::Message(MessageError::TransactionIdAlreadyAssigned(
                transaction_id.to_string(),
            )));
        }

        message.stamp_born_timestamp();
        if self.inner.options.message_id_assignment == MessageIdAssignment::Client
            && message.message_id().is_none()
        {
            message.assign_message_id(Uuid::new_v4().to_string())?;
        }
        if message.message_id().is_none() && !message.properties().contains_key(headers::SEND_ID)
        {
            message
                .properties_mut()
                .put(headers::SEND_ID, Uuid::new_v4().to_string());
        }

        let in_flight = send_key(&message).map(|key| InFlightSend::acquire(&self.inner, key));

        let receipt = self
            .inner
            .backend
            .send_half_message(&message)
            .await
            .map_err(Error::TransactionPrepareFailure)?;

        let properties = receipt.properties;
        let transaction_id = receipt.transaction_id;
        message.assign_transaction_id(transaction_id.as_str())?;
        if message.message_id().is_none() {
            message.assign_message_id(
                receipt
                    .message_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            )?;
        }
        let message_id = message.message_id().unwrap_or_default().to_string();

        debug!("half-message {message_id} stored as transaction {transaction_id}");

        let inserted = self.insert_record(&transaction_id, &message, executor);
        drop(in_flight);

        let Some(mut record) = inserted else {
            let state = self.state(&transaction_id).await;
            warn!("transaction {transaction_id} already tracked, not executing again");
            return Ok(transactional_result(
                message_id,
                transaction_id,
                state,
                properties,
            ));
        };

        self.emit(TransactionEvent::Prepared {
            transaction_id: transaction_id.clone(),
            message_id: message_id.clone(),
        });

        let resolution = match record.executor.take() {
            Some(executor) => {
                let message = message.clone();
                self.run_local(&transaction_id, "execute", async move {
                    executor.execute(&message, arg).await
                })
                .await
            }
            None => TransactionResolution::Unknown,
        };

        let state = match resolution.decision() {
            Some(decision) => {
                record.transition(decision.terminal_state());
                self.emit(TransactionEvent::Resolved {
                    transaction_id: transaction_id.clone(),
                    state: decision.terminal_state(),
                    source: ResolutionSource::Execute,
                });

                if self.deliver_decision(&transaction_id, decision).await {
                    self.release(&transaction_id, decision.terminal_state());
                }

                decision.terminal_state()
            }
            None => {
                record.transition(TransactionState::Unknown);
                info!("transaction {transaction_id} is unknown, awaiting recheck");
                TransactionState::Unknown
            }
        };
        drop(record);

        Ok(transactional_result(
            message_id,
            transaction_id,
            Some(state),
            properties,
        ))
    }

    /// Re-determines the outcome of the transaction `message` belongs to.
    ///
    /// Safe to call any number of times from any task. A decided transaction
    /// returns its recorded outcome without side effects. An unknown one is
    /// re-evaluated with the checker registered for the message's destination,
    /// or the default checker; the executor is never run again. Messages of
    /// transactions this coordinator does not track go straight to the checker,
    /// unless a send of the same message is still storing its half-message, in
    /// which case the answer is unknown.
    pub async fn check(&self, message: &Message) -> TransactionResolution {
        let Some(transaction_id) = message.transaction_id() else {
            warn!("check requested for a message without transaction id");
            return TransactionResolution::Unknown;
        };

        // Looked up before the records: a send drops its marker only after
        // inserting the record.
        if send_key(message).is_some_and(|key| self.inner.in_flight.contains_key(key)) {
            debug!("transaction {transaction_id} is still being prepared");
            return TransactionResolution::Unknown;
        }

        let record = self
            .inner
            .records
            .get(transaction_id)
            .map(|entry| Arc::clone(entry.value()));

        if let Some(record) = record {
            let mut record = record.lock().await;
            if let Some(decision) = record.state().decision() {
                // Decided but never acknowledged; the check answer carries it now.
                drop(record);
                self.release(transaction_id, decision.terminal_state());
                return decision.into();
            }

            record.check_count = record.check_count.saturating_add(1);
            let resolution = self.run_checker(&record.message).await;

            match resolution.decision() {
                Some(decision) => {
                    record.transition(decision.terminal_state());
                    drop(record);

                    info!("transaction {transaction_id} resolved to {decision} by check");
                    self.emit(TransactionEvent::Resolved {
                        transaction_id: transaction_id.to_string(),
                        state: decision.terminal_state(),
                        source: ResolutionSource::Check,
                    });
                    self.release(transaction_id, decision.terminal_state());
                }
                None => debug!(
                    "transaction {transaction_id} still unknown after {} checks",
                    record.check_count
                ),
            }

            return resolution;
        }

        let completed = self.inner.completed.lock().get(transaction_id).copied();
        if let Some(decision) = completed.and_then(TransactionState::decision) {
            return decision.into();
        }

        debug!("transaction {transaction_id} not tracked, delegating to checker");
        self.run_checker(message).await
    }

    /// The local state of a transaction, if it is still known.
    pub async fn state(&self, transaction_id: &str) -> Option<TransactionState> {
        let record = self
            .inner
            .records
            .get(transaction_id)
            .map(|entry| Arc::clone(entry.value()));

        match record {
            Some(record) => Some(record.lock().await.state()),
            None => self.inner.completed.lock().get(transaction_id).copied(),
        }
    }

    /// Ids of transactions still tracked: unknown ones, and decided ones whose
    /// decision the backend has not acknowledged.
    ///
    /// Unknown transactions the backend gave up on stay here until
    /// [`Self::expire_unknown`] drops them.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.inner
            .records
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stops tracking unknown transactions prepared more than `max_age` ago.
    ///
    /// Records busy in a send or check are skipped. Returns the dropped ids;
    /// a later check for one of them goes to the checker.
    pub fn expire_unknown(&self, max_age: Duration) -> Vec<String> {
        let mut expired = Vec::new();

        self.inner.records.retain(|_, record| match record.try_lock() {
            Ok(record)
                if record.state() == TransactionState::Unknown
                    && record.created_at.elapsed() >= max_age =>
            {
                expired.push(record.transaction_id.clone());
                false
            }
            _ => true,
        });

        for transaction_id in &expired {
            warn!("expired unknown transaction {transaction_id}");
            self.emit(TransactionEvent::Expired {
                transaction_id: transaction_id.clone(),
            });
        }

        expired
    }

    /// Creates the record for a fresh transaction, already locked by the caller.
    ///
    /// Returns `None` if the id is already tracked or already finished.
    fn insert_record(
        &self,
        transaction_id: &str,
        message: &Message,
        executor: Arc<dyn LocalTransactionExecutor>,
    ) -> Option<OwnedMutexGuard<TransactionRecord>> {
        if self.inner.completed.lock().contains(transaction_id) {
            return None;
        }

        match self.inner.records.entry(transaction_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let record = Arc::new(Mutex::new(TransactionRecord::new(
                    transaction_id.to_string(),
                    message.clone(),
                    executor,
                )));
                let guard = Arc::clone(&record).try_lock_owned().ok()?;
                vacant.insert(record);
                Some(guard)
            }
        }
    }

    /// Runs a local callback on its own task, bounded by the execution timeout.
    ///
    /// Errors, panics and timeouts all count as unknown. A timed out callback
    /// keeps running but its answer is discarded.
    async fn run_local<F>(&self, transaction_id: &str, phase: &str, task: F) -> TransactionResolution
    where
        F: Future<Output = std::result::Result<TransactionResolution, LocalTransactionError>>
            + Send
            + 'static,
    {
        let window = self.inner.options.local_execution_timeout;

        let ambiguity = match timeout(window, tokio::spawn(task)).await {
            Ok(Ok(Ok(resolution))) => return resolution,
            Ok(Ok(Err(e))) => LocalExecutionAmbiguous::from(e),
            Ok(Err(_)) => LocalExecutionAmbiguous::Panicked,
            Err(_) => LocalExecutionAmbiguous::TimedOut(window),
        };

        warn!("{phase} for transaction {transaction_id} treated as unknown: {ambiguity}");
        self.emit(TransactionEvent::Ambiguous {
            transaction_id: transaction_id.to_string(),
            reason: ambiguity.to_string(),
        });

        TransactionResolution::Unknown
    }

    async fn run_checker(&self, message: &Message) -> TransactionResolution {
        let checker = self
            .inner
            .destination_checkers
            .get(message.destination())
            .map_or_else(
                || Arc::clone(&self.inner.checker),
                |entry| Arc::clone(entry.value()),
            );

        let transaction_id = message.transaction_id().unwrap_or_default().to_string();
        let message = message.clone();

        self.run_local(&transaction_id, "check", async move {
            checker.check(&message).await
        })
        .await
    }

    /// Sends a decision, retrying on failure. Returns whether it was acknowledged.
    async fn deliver_decision(&self, transaction_id: &str, decision: Decision) -> bool {
        let retries = self.inner.options.decision_retry_attempts;
        let mut attempts = 0_u32;

        let last_error: BackendError = loop {
            attempts = attempts.saturating_add(1);

            match self
                .inner
                .backend
                .notify_decision(transaction_id, decision)
                .await
            {
                Ok(()) => {
                    debug!("backend acknowledged {decision} for transaction {transaction_id}");
                    self.emit(TransactionEvent::DecisionDelivered {
                        transaction_id: transaction_id.to_string(),
                        decision,
                    });
                    return true;
                }
                Err(e) if attempts <= retries => {
                    debug!("delivering {decision} for transaction {transaction_id} failed: {e}");
                    sleep(self.inner.options.decision_retry_delay).await;
                }
                Err(e) => break e,
            }
        };

        warn!(
            "giving up delivering {decision} for transaction {transaction_id} after {attempts} attempts: {last_error}"
        );
        self.emit(TransactionEvent::DecisionDeliveryFailed {
            transaction_id: transaction_id.to_string(),
            decision,
            attempts,
            error: last_error,
        });

        false
    }

    /// Moves a decided transaction out of the active table.
    ///
    /// The outcome is remembered before the record is dropped so a concurrent
    /// `check` always finds one or the other.
    fn release(&self, transaction_id: &str, state: TransactionState) {
        self.inner
            .completed
            .lock()
            .put(transaction_id.to_string(), state);
        self.inner.records.remove(transaction_id);
    }

    fn emit(&self, event: TransactionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn transactional_result(
    message_id: String,
    transaction_id: String,
    state: Option<TransactionState>,
    properties: KeyValue,
) -> SendResult {
    SendResult::transactional(
        message_id,
        transaction_id,
        state.unwrap_or(TransactionState::Unknown),
        properties,
    )
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("options", &self.inner.options)
            .field("pending", &self.inner.records.len())
            .finish_non_exhaustive()
    }
}
