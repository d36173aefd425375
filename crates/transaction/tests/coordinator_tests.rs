//! Transactional sends against a scripted backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use oms_messaging::{
    BackendError, CheckRequest, Decision, HalfMessageReceipt, KeyValue, LocalTransactionChecker,
    LocalTransactionError, LocalTransactionExecutor, Message, MessageError, TransactionBackend,
    TransactionResolution, TransactionState,
};
use oms_transaction::{
    Error, MessageIdAssignment, ResolutionSource, TransactionCoordinator,
    TransactionCoordinatorOptions, TransactionEvent,
};
use tokio::sync::{mpsc, oneshot};

#[derive(Default)]
struct ScriptedBackend {
    check_sender: parking_lot::Mutex<Option<mpsc::Sender<CheckRequest>>>,
    decisions: parking_lot::Mutex<Vec<(String, Decision)>>,
    failing_decisions: AtomicU32,
    next_id: AtomicUsize,
    reject_sends: parking_lot::Mutex<Option<BackendError>>,
    sends: AtomicUsize,
    server_message_ids: bool,
}

impl ScriptedBackend {
    fn decisions(&self) -> Vec<(String, Decision)> {
        self.decisions.lock().clone()
    }

    fn check_sender(&self) -> Option<mpsc::Sender<CheckRequest>> {
        self.check_sender.lock().clone()
    }
}

#[async_trait]
impl TransactionBackend for ScriptedBackend {
    async fn send_half_message(
        &self,
        _message: &Message,
    ) -> Result<HalfMessageReceipt, BackendError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.reject_sends.lock().clone() {
            return Err(error);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(HalfMessageReceipt {
            message_id: self.server_message_ids.then(|| format!("srv-{n}")),
            properties: KeyValue::new().with("queue_offset", i64::try_from(n).unwrap()),
            transaction_id: format!("tx-{n}"),
        })
    }

    async fn notify_decision(
        &self,
        transaction_id: &str,
        decision: Decision,
    ) -> Result<(), BackendError> {
        let failed = self
            .failing_decisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::BackendUnavailable("scripted".to_string()));
        }

        self.decisions
            .lock()
            .push((transaction_id.to_string(), decision));
        Ok(())
    }

    fn attach_check_channel(&self, sender: mpsc::Sender<CheckRequest>) {
        *self.check_sender.lock() = Some(sender);
    }
}

enum Script {
    Answer(TransactionResolution),
    Fail,
    Panic,
    Stall,
}

/// Executor and checker in one, counting calls.
struct Local {
    calls: AtomicUsize,
    script: Script,
}

impl Local {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script,
        })
    }

    fn answering(resolution: TransactionResolution) -> Arc<Self> {
        Self::new(Script::Answer(resolution))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<TransactionResolution, LocalTransactionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.script {
            Script::Answer(resolution) => Ok(resolution),
            Script::Fail => Err(LocalTransactionError::new("database unavailable")),
            Script::Panic => panic!("local transaction blew up"),
            Script::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(TransactionResolution::Commit)
            }
        }
    }
}

#[async_trait]
impl LocalTransactionExecutor for Local {
    async fn execute(
        &self,
        _message: &Message,
        _arg: Option<Bytes>,
    ) -> Result<TransactionResolution, LocalTransactionError> {
        self.run().await
    }
}

#[async_trait]
impl LocalTransactionChecker for Local {
    async fn check(
        &self,
        _message: &Message,
    ) -> Result<TransactionResolution, LocalTransactionError> {
        self.run().await
    }
}

/// Decides by the `amount` property: even commits, odd rolls back.
struct ByAmount;

#[async_trait]
impl LocalTransactionExecutor for ByAmount {
    async fn execute(
        &self,
        message: &Message,
        _arg: Option<Bytes>,
    ) -> Result<TransactionResolution, LocalTransactionError> {
        match message.properties().get_int("amount") {
            Some(amount) if amount % 2 == 0 => Ok(TransactionResolution::Commit),
            Some(_) => Ok(TransactionResolution::Rollback),
            None => Err(LocalTransactionError::new("no amount")),
        }
    }
}

fn options() -> TransactionCoordinatorOptions {
    TransactionCoordinatorOptions {
        decision_retry_delay: Duration::from_millis(10),
        local_execution_timeout: Duration::from_millis(500),
        ..TransactionCoordinatorOptions::default()
    }
}

fn coordinator(
    backend: &Arc<ScriptedBackend>,
    checker: &Arc<Local>,
    options: TransactionCoordinatorOptions,
) -> TransactionCoordinator {
    TransactionCoordinator::new(backend.clone(), checker.clone(), options)
}

fn sent_message(transaction_id: &str) -> Message {
    let mut message = Message::new("orders", "payload");
    message.assign_transaction_id(transaction_id).unwrap();
    message
}

#[tokio::test]
async fn test_commit_delivers_one_decision() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Unknown);
    let executor = Local::answering(TransactionResolution::Commit);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(Message::new("orders", "payload"), executor.clone(), None)
        .await
        .unwrap();

    assert_eq!(result.transaction_id(), Some("tx-0"));
    assert_eq!(result.transaction_state(), Some(TransactionState::Committed));
    assert!(!result.message_id().is_empty());
    assert_eq!(result.properties().get_long("queue_offset"), Some(0));
    assert_eq!(backend.decisions(), [("tx-0".to_string(), Decision::Commit)]);
    assert_eq!(executor.calls(), 1);
    assert!(coordinator.pending().is_empty());
    assert_eq!(
        coordinator.state("tx-0").await,
        Some(TransactionState::Committed)
    );
}

#[tokio::test]
async fn test_rollback_delivers_one_decision() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Rollback),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::RolledBack));
    assert_eq!(backend.decisions(), [("tx-0".to_string(), Decision::Rollback)]);
}

#[tokio::test]
async fn test_server_assigned_message_id() {
    let backend = Arc::new(ScriptedBackend {
        server_message_ids: true,
        ..ScriptedBackend::default()
    });
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(
        &backend,
        &checker,
        TransactionCoordinatorOptions {
            message_id_assignment: MessageIdAssignment::Server,
            ..options()
        },
    );

    let result = coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Commit),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.message_id(), "srv-0");
}

#[tokio::test]
async fn test_failed_execution_awaits_check() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Commit);
    let executor = Local::new(Script::Fail);
    let coordinator = coordinator(&backend, &checker, options());
    let mut events = coordinator.subscribe_events();

    let result = coordinator
        .send(Message::new("orders", "payload"), executor.clone(), None)
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::Unknown));
    assert!(backend.decisions().is_empty());
    assert_eq!(coordinator.pending(), ["tx-0"]);
    assert_matches!(events.recv().await, Ok(TransactionEvent::Prepared { .. }));
    assert_matches!(
        events.recv().await,
        Ok(TransactionEvent::Ambiguous { reason, .. }) if reason.contains("database unavailable")
    );

    let resolution = coordinator.check(&sent_message("tx-0")).await;

    assert_eq!(resolution, TransactionResolution::Commit);
    assert_eq!(executor.calls(), 1);
    assert_eq!(checker.calls(), 1);
    assert!(coordinator.pending().is_empty());
    assert_matches!(
        events.recv().await,
        Ok(TransactionEvent::Resolved {
            state: TransactionState::Committed,
            source: ResolutionSource::Check,
            ..
        })
    );
}

#[tokio::test]
async fn test_panicking_execution_is_unknown() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(
            Message::new("orders", "payload"),
            Local::new(Script::Panic),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::Unknown));
    assert_eq!(
        coordinator.state("tx-0").await,
        Some(TransactionState::Unknown)
    );
}

#[tokio::test(start_paused = true)]
async fn test_stalled_execution_times_out() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(
            Message::new("orders", "payload"),
            Local::new(Script::Stall),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::Unknown));
    assert!(backend.decisions().is_empty());
}

#[tokio::test]
async fn test_racing_checks_resolve_once() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Commit);
    let executor = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());

    coordinator
        .send(Message::new("orders", "payload"), executor.clone(), None)
        .await
        .unwrap();

    let message = sent_message("tx-0");
    let resolutions = join_all((0..16).map(|_| coordinator.check(&message))).await;

    assert!(
        resolutions
            .iter()
            .all(|resolution| *resolution == TransactionResolution::Commit)
    );
    assert_eq!(checker.calls(), 1);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_checks_on_decided_transaction_are_idempotent() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Commit);
    let coordinator = coordinator(&backend, &checker, options());

    coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Rollback),
            None,
        )
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(
            coordinator.check(&sent_message("tx-0")).await,
            TransactionResolution::Rollback
        );
    }
    assert_eq!(checker.calls(), 0);
    assert_eq!(backend.decisions().len(), 1);
}

#[tokio::test]
async fn test_untracked_transaction_is_delegated_to_checker() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &checker, options());

    assert_eq!(
        coordinator.check(&sent_message("from-a-previous-run")).await,
        TransactionResolution::Rollback
    );
    assert_eq!(
        coordinator.check(&Message::new("orders", "payload")).await,
        TransactionResolution::Unknown
    );
    assert_eq!(checker.calls(), 1);
}

#[tokio::test]
async fn test_destination_checker_takes_precedence() {
    let backend = Arc::new(ScriptedBackend::default());
    let default_checker = Local::answering(TransactionResolution::Commit);
    let audit_checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &default_checker, options());
    coordinator.register_checker("audit", audit_checker.clone());

    coordinator
        .send(
            Message::new("audit", "payload"),
            Local::answering(TransactionResolution::Unknown),
            None,
        )
        .await
        .unwrap();

    let mut message = Message::new("audit", "payload");
    message.assign_transaction_id("tx-0").unwrap();

    assert_eq!(
        coordinator.check(&message).await,
        TransactionResolution::Rollback
    );
    assert_eq!(audit_checker.calls(), 1);
    assert_eq!(default_checker.calls(), 0);
}

#[tokio::test]
async fn test_prepare_failure_creates_no_transaction() {
    let backend = Arc::new(ScriptedBackend {
        reject_sends: parking_lot::Mutex::new(Some(BackendError::MessageRejected(
            "topic full".to_string(),
        ))),
        ..ScriptedBackend::default()
    });
    let checker = Local::answering(TransactionResolution::Unknown);
    let executor = Local::answering(TransactionResolution::Commit);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(Message::new("orders", "payload"), executor.clone(), None)
        .await;

    assert_matches!(
        result,
        Err(Error::TransactionPrepareFailure(BackendError::MessageRejected(_)))
    );
    assert_eq!(executor.calls(), 0);
    assert!(coordinator.pending().is_empty());
    assert!(backend.decisions().is_empty());
}

#[tokio::test]
async fn test_already_transactional_message_is_refused() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());

    let result = coordinator
        .send(
            sent_message("tx-old"),
            Local::answering(TransactionResolution::Commit),
            None,
        )
        .await;

    assert_matches!(
        result,
        Err(Error::Message(MessageError::TransactionIdAlreadyAssigned(id))) if id == "tx-old"
    );
    assert_eq!(backend.sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_decision_retries_then_reports_failure() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let backend = Arc::new(ScriptedBackend {
        failing_decisions: AtomicU32::new(u32::MAX),
        ..ScriptedBackend::default()
    });
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(
        &backend,
        &checker,
        TransactionCoordinatorOptions {
            decision_retry_attempts: 2,
            ..options()
        },
    );
    let mut events = coordinator.subscribe_events();

    let result = coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Commit),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::Committed));
    assert_eq!(coordinator.pending(), ["tx-0"]);

    let failure = loop {
        if let TransactionEvent::DecisionDeliveryFailed {
            decision, attempts, ..
        } = events.recv().await.unwrap()
        {
            break (decision, attempts);
        }
    };
    assert_eq!(failure, (Decision::Commit, 3));

    // A later recheck carries the decision and releases the transaction.
    assert_eq!(
        coordinator.check(&sent_message("tx-0")).await,
        TransactionResolution::Commit
    );
    assert_eq!(checker.calls(), 0);
    assert!(coordinator.pending().is_empty());
}

#[tokio::test]
async fn test_decision_retry_recovers() {
    let backend = Arc::new(ScriptedBackend {
        failing_decisions: AtomicU32::new(2),
        ..ScriptedBackend::default()
    });
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());

    coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Commit),
            None,
        )
        .await
        .unwrap();

    assert_eq!(backend.decisions(), [("tx-0".to_string(), Decision::Commit)]);
    assert!(coordinator.pending().is_empty());
}

#[tokio::test]
async fn test_concurrent_transactions_are_isolated() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Unknown);
    let coordinator = coordinator(&backend, &checker, options());
    let executor = Arc::new(ByAmount);

    let sends = (0..32).map(|amount| {
        let coordinator = coordinator.clone();
        let executor = executor.clone();
        tokio::spawn(async move {
            let message = Message::new("orders", "payload").with_property("amount", amount);
            let result = coordinator.send(message, executor, None).await.unwrap();
            (amount, result)
        })
    });

    for joined in join_all(sends).await {
        let (amount, result) = joined.unwrap();
        let expected = if amount % 2 == 0 {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        };
        assert_eq!(result.transaction_state(), Some(expected));
    }

    let decisions = backend.decisions();
    assert_eq!(decisions.len(), 32);
    assert_eq!(
        decisions
            .iter()
            .filter(|(_, decision)| *decision == Decision::Commit)
            .count(),
        16
    );
    assert!(coordinator.pending().is_empty());
}

#[tokio::test]
async fn test_start_serves_backend_checks() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Commit);
    let coordinator = coordinator(&backend, &checker, options());

    assert_matches!(coordinator.shutdown().await, Err(Error::NotStarted));

    coordinator.start().unwrap();
    assert_matches!(coordinator.start(), Err(Error::AlreadyStarted));

    coordinator
        .send(
            Message::new("orders", "payload"),
            Local::answering(TransactionResolution::Unknown),
            None,
        )
        .await
        .unwrap();

    let sender = backend.check_sender().unwrap();
    let (reply, answer) = oneshot::channel();
    sender
        .send(CheckRequest {
            message: sent_message("tx-0"),
            reply,
        })
        .await
        .unwrap();

    assert_eq!(answer.await.unwrap(), TransactionResolution::Commit);
    assert_eq!(
        coordinator.state("tx-0").await,
        Some(TransactionState::Committed)
    );

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_serves_checks_on_new_channel() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &checker, options());

    coordinator.start().unwrap();
    coordinator.shutdown().await.unwrap();
    coordinator.start().unwrap();

    let sender = backend.check_sender().unwrap();
    let (reply, answer) = oneshot::channel();
    sender
        .send(CheckRequest {
            message: sent_message("from-a-previous-run"),
            reply,
        })
        .await
        .unwrap();

    assert_eq!(answer.await.unwrap(), TransactionResolution::Rollback);
    assert_eq!(checker.calls(), 1);

    coordinator.shutdown().await.unwrap();
    assert_matches!(coordinator.shutdown().await, Err(Error::NotStarted));
}

/// Checks the half-message before acknowledging it, like a backend whose
/// recheck fires while the send call is still in flight.
#[derive(Default)]
struct EagerCheckBackend {
    answers: parking_lot::Mutex<Vec<TransactionResolution>>,
    coordinator: parking_lot::Mutex<Option<TransactionCoordinator>>,
    decisions: parking_lot::Mutex<Vec<Decision>>,
    server_message_ids: AtomicBool,
}

#[async_trait]
impl TransactionBackend for EagerCheckBackend {
    async fn send_half_message(
        &self,
        message: &Message,
    ) -> Result<HalfMessageReceipt, BackendError> {
        let n = self.answers.lock().len();
        let server_id = self
            .server_message_ids
            .load(Ordering::SeqCst)
            .then(|| format!("srv-{n}"));
        let transaction_id = format!("tx-{n}");

        let mut stored = message.clone();
        stored.assign_transaction_id(transaction_id.as_str()).unwrap();
        if let Some(id) = &server_id {
            stored.assign_message_id(id.as_str()).unwrap();
        }

        let coordinator = self.coordinator.lock().clone().unwrap();
        let answer = coordinator.check(&stored).await;
        self.answers.lock().push(answer);

        Ok(HalfMessageReceipt {
            message_id: server_id,
            properties: KeyValue::new(),
            transaction_id,
        })
    }

    async fn notify_decision(
        &self,
        _transaction_id: &str,
        decision: Decision,
    ) -> Result<(), BackendError> {
        self.decisions.lock().push(decision);
        Ok(())
    }

    fn attach_check_channel(&self, _sender: mpsc::Sender<CheckRequest>) {}
}

#[tokio::test]
async fn test_check_before_record_exists_is_unknown() {
    for assignment in [MessageIdAssignment::Client, MessageIdAssignment::Server] {
        let backend = Arc::new(EagerCheckBackend::default());
        backend
            .server_message_ids
            .store(assignment == MessageIdAssignment::Server, Ordering::SeqCst);
        let checker = Local::answering(TransactionResolution::Rollback);
        let executor = Local::answering(TransactionResolution::Commit);
        let coordinator = TransactionCoordinator::new(
            backend.clone(),
            checker.clone(),
            TransactionCoordinatorOptions {
                message_id_assignment: assignment,
                ..options()
            },
        );
        *backend.coordinator.lock() = Some(coordinator.clone());

        let result = coordinator
            .send(Message::new("orders", "payload"), executor.clone(), None)
            .await
            .unwrap();

        assert_eq!(result.transaction_state(), Some(TransactionState::Committed));
        assert_eq!(*backend.answers.lock(), [TransactionResolution::Unknown]);
        assert_eq!(*backend.decisions.lock(), [Decision::Commit]);
        assert_eq!(checker.calls(), 0);
        assert_eq!(executor.calls(), 1);

        *backend.coordinator.lock() = None;
    }
}

#[tokio::test]
async fn test_failed_prepare_releases_in_flight_send() {
    let backend = Arc::new(ScriptedBackend {
        reject_sends: parking_lot::Mutex::new(Some(BackendError::BackendUnavailable(
            "down".to_string(),
        ))),
        ..ScriptedBackend::default()
    });
    let checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &checker, options());

    let mut message = Message::new("orders", "payload");
    message.assign_message_id("m-1").unwrap();
    let result = coordinator
        .send(
            message,
            Local::answering(TransactionResolution::Commit),
            None,
        )
        .await;
    assert!(result.is_err());

    let mut checked = sent_message("tx-elsewhere");
    checked.assign_message_id("m-1").unwrap();

    assert_eq!(
        coordinator.check(&checked).await,
        TransactionResolution::Rollback
    );
    assert_eq!(checker.calls(), 1);
}

/// Executor and checker that record how many of them run at once.
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    checks: AtomicUsize,
    max_active: AtomicUsize,
}

impl Overlap {
    async fn run(&self, resolution: TransactionResolution) -> TransactionResolution {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        resolution
    }
}

#[async_trait]
impl LocalTransactionExecutor for Overlap {
    async fn execute(
        &self,
        _message: &Message,
        _arg: Option<Bytes>,
    ) -> Result<TransactionResolution, LocalTransactionError> {
        Ok(self.run(TransactionResolution::Commit).await)
    }
}

#[async_trait]
impl LocalTransactionChecker for Overlap {
    async fn check(
        &self,
        _message: &Message,
    ) -> Result<TransactionResolution, LocalTransactionError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.run(TransactionResolution::Rollback).await)
    }
}

#[tokio::test(start_paused = true)]
async fn test_check_waits_for_running_execution() {
    let backend = Arc::new(ScriptedBackend::default());
    let local = Arc::new(Overlap::default());
    let coordinator = TransactionCoordinator::new(backend.clone(), local.clone(), options());

    let check = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            coordinator.check(&sent_message("tx-0")).await
        })
    };

    let result = coordinator
        .send(Message::new("orders", "payload"), local.clone(), None)
        .await
        .unwrap();

    assert_eq!(result.transaction_state(), Some(TransactionState::Committed));
    assert_eq!(check.await.unwrap(), TransactionResolution::Commit);
    assert_eq!(local.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(local.checks.load(Ordering::SeqCst), 0);
    assert_eq!(backend.decisions(), [("tx-0".to_string(), Decision::Commit)]);
}

#[tokio::test(start_paused = true)]
async fn test_expire_unknown_drops_old_transactions() {
    let backend = Arc::new(ScriptedBackend::default());
    let checker = Local::answering(TransactionResolution::Rollback);
    let coordinator = coordinator(&backend, &checker, options());
    let mut events = coordinator.subscribe_events();

    for _ in 0..2 {
        coordinator
            .send(
                Message::new("orders", "payload"),
                Local::answering(TransactionResolution::Unknown),
                None,
            )
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
    }

    assert_eq!(coordinator.expire_unknown(Duration::from_secs(45)), ["tx-0"]);
    assert_eq!(coordinator.pending(), ["tx-1"]);
    assert!(coordinator.expire_unknown(Duration::from_secs(45)).is_empty());

    let expired = loop {
        if let TransactionEvent::Expired { transaction_id } = events.recv().await.unwrap() {
            break transaction_id;
        }
    };
    assert_eq!(expired, "tx-0");

    assert_eq!(coordinator.state("tx-0").await, None);
    assert_eq!(
        coordinator.check(&sent_message("tx-0")).await,
        TransactionResolution::Rollback
    );
    assert_eq!(checker.calls(), 1);
}
