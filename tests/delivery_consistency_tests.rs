//! Exactly-once processing on top of the in-memory outbox.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use common::*;
use courier_core::constants::headers;
use courier_core::handlers::{HandleMessages, MessageHandlerContext};
use courier_core::message::AddressTag;
use courier_core::outbox::{InMemoryOutboxTransaction, OutboxStorage};
use courier_core::pipeline::{HandlerError, ProcessingError};
use courier_core::message::{IncomingEnvelope, TransportOperation};
use courier_core::outbox::InMemoryOutboxStorage;
use courier_core::transport::{InMemoryTransport, Transport, TransportError};
use courier_core::{EndpointBuilder, ProcessingOutcome};

#[tokio::test]
async fn test_single_message_is_handled_once_and_recorded() {
    let log = EventLog::default();
    let handler = Arc::new(OrderPlacedHandler::new(log.clone(), OrderReaction::SendBill));
    let test = order_endpoint(Arc::clone(&handler));

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Processed { dispatched: 1 });
    assert_eq!(handler.invocations(), 1);

    let record = test.storage.record("m-1").expect("outbox record for m-1");
    assert!(record.dispatched);
    assert_eq!(record.operations.len(), 1);
    assert!(record.operations[0].dispatched);

    let bills = test.transport.dispatched_to(&AddressTag::unicast("billing"));
    assert_eq!(bills.len(), 1);
}

#[tokio::test]
async fn test_redelivery_replays_without_invoking_handlers() {
    let log = EventLog::default();
    let handler = Arc::new(OrderPlacedHandler::new(log.clone(), OrderReaction::SendBill));
    let test = order_endpoint(Arc::clone(&handler));

    test.endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();
    let first = test.transport.take_dispatched();

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Duplicate { replayed: 1 });
    assert_eq!(handler.invocations(), 1);
    assert_eq!(log.count("OrderPlaced:7"), 1);

    // The replayed send is the identical stored operation
    assert_eq!(test.transport.dispatched(), first);
    assert_eq!(test.storage.len(), 1);
}

#[tokio::test]
async fn test_handler_failure_leaves_no_record_and_redelivery_reruns() {
    let log = EventLog::default();
    let handler = Arc::new(OrderPlacedHandler::new(log, OrderReaction::SendBill).failing(1));
    let test = order_endpoint(Arc::clone(&handler));

    let err = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::Handler { .. }));
    assert!(test.storage.record("m-1").is_none());
    // The send captured before the failure was discarded with the transaction
    assert!(test.transport.dispatched().is_empty());

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Processed { dispatched: 1 });
    assert_eq!(handler.invocations(), 2);
    assert_eq!(test.transport.dispatched().len(), 1);
}

#[tokio::test]
async fn test_dispatch_failure_after_commit_is_retried_by_replay() {
    let handler = Arc::new(OrderPlacedHandler::new(
        EventLog::default(),
        OrderReaction::SendTwoBills,
    ));
    let test = order_endpoint(Arc::clone(&handler));
    test.transport.fail_next_dispatches(1);

    let err = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap_err();

    assert!(err.is_post_commit());
    match &err {
        ProcessingError::Dispatch { message_id, .. } => assert_eq!(message_id, "m-1"),
        other => panic!("unexpected error: {other}"),
    }
    let record = test.storage.record("m-1").unwrap();
    assert!(!record.dispatched);
    assert_eq!(record.undispatched_count(), 2);

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Duplicate { replayed: 2 });
    assert_eq!(handler.invocations(), 1);
    assert_eq!(test.transport.dispatched().len(), 2);
    assert!(test.storage.record("m-1").unwrap().dispatched);
}

#[tokio::test]
async fn test_partially_dispatched_record_replays_outstanding_operations() {
    let handler = Arc::new(OrderPlacedHandler::new(
        EventLog::default(),
        OrderReaction::SendTwoBills,
    ));
    let test = order_endpoint(Arc::clone(&handler));
    test.transport.fail_next_dispatches(1);

    test.endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap_err();

    // First operation reached the broker out of band before the crash
    test.storage.mark_operation_dispatched("m-1", 0).await.unwrap();
    let record = test.storage.record("m-1").unwrap();
    let outstanding = record.operations[1].operation.clone();

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Duplicate { replayed: 1 });
    assert_eq!(test.transport.dispatched(), vec![outstanding]);
}

#[tokio::test]
async fn test_fully_dispatched_record_replays_every_operation() {
    let handler = Arc::new(OrderPlacedHandler::new(
        EventLog::default(),
        OrderReaction::SendTwoBills,
    ));
    let test = order_endpoint(Arc::clone(&handler));

    test.endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();
    test.transport.take_dispatched();

    let outcome = test
        .endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Duplicate { replayed: 2 });
    assert_eq!(test.transport.dispatched().len(), 2);
}

#[tokio::test]
async fn test_immediate_dispatch_bypasses_outbox_capture() {
    let handler = Arc::new(OrderPlacedHandler::new(
        EventLog::default(),
        OrderReaction::SendImmediatelyThenFail,
    ));
    let test = order_endpoint(Arc::clone(&handler));

    test.endpoint
        .process(order_placed_envelope("m-1", 7))
        .await
        .unwrap_err();

    assert!(test.storage.record("m-1").is_none());
    let sent = test.transport.dispatched();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, AddressTag::unicast("billing"));
}

#[tokio::test]
async fn test_disabled_outbox_processes_redeliveries_again() {
    let handler = Arc::new(OrderPlacedHandler::new(EventLog::default(), OrderReaction::SendBill));
    let mut config = test_config();
    config.outbox.enabled = false;
    let test = build_endpoint(config, |builder| {
        builder.register_shared_handler::<OrderPlaced, _>(Arc::clone(&handler))
    });

    for _ in 0..2 {
        let outcome = test
            .endpoint
            .process(order_placed_envelope("m-1", 7))
            .await
            .unwrap();
        assert_eq!(outcome, ProcessingOutcome::Processed { dispatched: 1 });
    }

    assert_eq!(handler.invocations(), 2);
    assert!(test.storage.is_empty());
    assert_eq!(test.transport.dispatched().len(), 2);
}

/// Enlists a business-state change in the outbox transaction
struct EnlistingHandler {
    committed_changes: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl HandleMessages<OrderPlaced> for EnlistingHandler {
    async fn handle(
        &self,
        _message: &OrderPlaced,
        context: &mut MessageHandlerContext,
    ) -> Result<(), HandlerError> {
        let transaction = context
            .outbox_transaction()
            .ok_or("no outbox transaction")?;
        let in_memory = transaction
            .as_any()
            .downcast_ref::<InMemoryOutboxTransaction>()
            .ok_or("unexpected transaction type")?;

        let changes = Arc::clone(&self.committed_changes);
        in_memory.enlist(move || {
            changes.fetch_add(1, Ordering::SeqCst);
        })?;

        if self.fail {
            return Err("rejected".into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_enlisted_changes_commit_with_the_record() {
    let committed = Arc::new(AtomicUsize::new(0));
    let test = build_endpoint(test_config(), |builder| {
        builder.register_handler::<OrderPlaced, _>(EnlistingHandler {
            committed_changes: Arc::clone(&committed),
            fail: false,
        })
    });

    test.endpoint
        .process(order_placed_envelope("m-1", 1))
        .await
        .unwrap();

    assert_eq!(committed.load(Ordering::SeqCst), 1);
    assert!(test.storage.record("m-1").is_some());
}

#[tokio::test]
async fn test_enlisted_changes_are_discarded_on_handler_failure() {
    let committed = Arc::new(AtomicUsize::new(0));
    let test = build_endpoint(test_config(), |builder| {
        builder.register_handler::<OrderPlaced, _>(EnlistingHandler {
            committed_changes: Arc::clone(&committed),
            fail: true,
        })
    });

    test.endpoint
        .process(order_placed_envelope("m-1", 1))
        .await
        .unwrap_err();

    assert_eq!(committed.load(Ordering::SeqCst), 0);
    assert!(test.storage.record("m-1").is_none());
}

#[tokio::test]
async fn test_receive_once_abandons_failed_envelope_for_redelivery() {
    let handler = Arc::new(OrderPlacedHandler::new(EventLog::default(), OrderReaction::SendBill).failing(1));
    let test = order_endpoint(Arc::clone(&handler));
    test.transport.enqueue(order_placed_envelope("m-1", 7));

    assert!(test.endpoint.receive_once().await.is_err());
    assert_eq!(test.transport.total_abandoned(), 1);
    assert_eq!(test.transport.pending_len(), 1);

    let outcome = test.endpoint.receive_once().await.unwrap();
    assert_eq!(outcome, Some(ProcessingOutcome::Processed { dispatched: 1 }));
    assert_eq!(test.transport.total_completed(), 1);
    assert_eq!(handler.invocations(), 2);

    assert_eq!(test.endpoint.receive_once().await.unwrap(), None);
}

/// Rejects the first acknowledgement it is asked for
struct LostAckTransport {
    inner: InMemoryTransport,
    lose_next_ack: AtomicUsize,
}

#[async_trait]
impl Transport for LostAckTransport {
    async fn receive(&self) -> Result<Option<IncomingEnvelope>, TransportError> {
        self.inner.receive().await
    }

    async fn complete(&self, message_id: &str) -> Result<(), TransportError> {
        if self.lose_next_ack.swap(0, Ordering::SeqCst) > 0 {
            return Err(TransportError::NotInFlight {
                message_id: message_id.to_string(),
            });
        }
        self.inner.complete(message_id).await
    }

    async fn abandon(&self, envelope: IncomingEnvelope) -> Result<(), TransportError> {
        self.inner.abandon(envelope).await
    }

    async fn dispatch(&self, operation: &TransportOperation) -> Result<(), TransportError> {
        self.inner.dispatch(operation).await
    }
}

#[tokio::test]
async fn test_failed_acknowledgement_abandons_and_redelivery_replays() {
    let handler = Arc::new(OrderPlacedHandler::new(EventLog::default(), OrderReaction::SendBill));
    let transport = Arc::new(LostAckTransport {
        inner: InMemoryTransport::new("sales"),
        lose_next_ack: AtomicUsize::new(1),
    });
    let endpoint = EndpointBuilder::new(test_config(), transport.clone())
        .with_outbox_storage(Arc::new(InMemoryOutboxStorage::new()))
        .register_shared_handler::<OrderPlaced, _>(Arc::clone(&handler))
        .build()
        .unwrap();
    transport.inner.enqueue(order_placed_envelope("m-1", 7));

    let err = endpoint.receive_once().await.unwrap_err();
    assert!(matches!(err, ProcessingError::Transport(_)));
    assert_eq!(transport.inner.total_abandoned(), 1);
    assert_eq!(transport.inner.pending_len(), 1);
    assert_eq!(transport.inner.in_flight_len(), 0);

    let outcome = endpoint.receive_once().await.unwrap();
    assert_eq!(outcome, Some(ProcessingOutcome::Duplicate { replayed: 1 }));
    assert_eq!(handler.invocations(), 1);
    assert_eq!(transport.inner.total_completed(), 1);
}

#[tokio::test]
async fn test_concurrent_redeliveries_commit_a_single_record() {
    let handler = Arc::new(OrderPlacedHandler::new(EventLog::default(), OrderReaction::SendBill));
    let test = order_endpoint(Arc::clone(&handler));

    let results = futures::future::join_all(
        (0..4).map(|_| test.endpoint.process(order_placed_envelope("m-1", 7))),
    )
    .await;

    // Competing copies either win the commit, lose it, or see the record
    let processed = results
        .iter()
        .filter(|result| matches!(result, Ok(ProcessingOutcome::Processed { .. })))
        .count();
    assert_eq!(processed, 1);
    assert!(results.iter().all(|result| match result {
        Ok(_) => true,
        Err(ProcessingError::Storage(_)) => true,
        Err(other) => panic!("unexpected error: {other}"),
    }));
    assert_eq!(test.storage.len(), 1);
    assert!(test
        .transport
        .dispatched()
        .iter()
        .all(|operation| operation.header(headers::RELATED_TO) == Some("m-1")));
}
