//! # Delivery Consistency Connector
//!
//! Makes at-least-once delivery look exactly-once to handlers and to the
//! messages they send.
//!
//! ## Protocol
//!
//! 1. Begin a storage transaction and look up the outbox record for the
//!    incoming message id.
//! 2. Record found: skip handlers and replay the stored operations (all of
//!    them when the record is fully dispatched, only the outstanding ones
//!    otherwise).
//! 3. No record: run the incoming physical chain with outgoing operations
//!    captured instead of sent. On failure, roll back and surface the error so
//!    the transport redelivers. On success, store the record, commit, dispatch
//!    operation by operation, then mark the record dispatched.
//!
//! Without storage, or with the outbox disabled, the connector is a
//! pass-through: operations are still captured and sent after the handlers
//! succeed, but redeliveries are processed again.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::context::{
    DispatchContext, IncomingPhysicalContext, ProcessingOutcome, TransportReceiveContext,
};
use crate::message::TransportOperation;
use crate::outbox::{OutboxRecord, OutboxStorage, OutboxTransaction, PendingTransportOperations};
use crate::pipeline::{
    ProcessingError, ProcessingResult, StageConnector, StageContext, StageInvoker,
};

pub struct DeliveryConsistencyConnector {
    storage: Option<Arc<dyn OutboxStorage>>,
}

impl DeliveryConsistencyConnector {
    /// `storage` is `None` for a pass-through connector
    pub fn new(storage: Option<Arc<dyn OutboxStorage>>) -> Self {
        Self { storage }
    }

    pub fn is_pass_through(&self) -> bool {
        self.storage.is_none()
    }

    async fn process_with_outbox(
        &self,
        storage: &dyn OutboxStorage,
        context: &mut TransportReceiveContext,
        stage: StageInvoker<'_, IncomingPhysicalContext>,
    ) -> ProcessingResult<ProcessingOutcome> {
        let message_id = context.message.message_id.clone();
        let transaction = storage.begin_transaction().await?;

        let existing = match storage.get(&message_id).await {
            Ok(existing) => existing,
            Err(err) => {
                rollback(transaction.as_ref(), &message_id).await;
                return Err(err.into());
            }
        };

        if let Some(record) = existing {
            rollback(transaction.as_ref(), &message_id).await;
            crate::log_outbox!(
                info,
                "DUPLICATE_DETECTED",
                message_id: message_id,
                fully_dispatched: record.dispatched,
                outstanding: record.undispatched_count()
            );
            let replayed = self.dispatch_record(storage, context, &record).await?;
            return Ok(ProcessingOutcome::Duplicate { replayed });
        }

        let pending = Arc::new(PendingTransportOperations::new());
        let mut physical =
            IncomingPhysicalContext::new(context.behavior_context(), (*context.message).clone());
        let extensions = physical.behavior_context().extensions();
        extensions.set_arc(Arc::clone(&pending));
        extensions.set(Arc::clone(&transaction));

        if let Err(err) = stage.invoke(&mut physical).await {
            rollback(transaction.as_ref(), &message_id).await;
            return Err(err);
        }

        let record = OutboxRecord::new(message_id.clone(), pending.take());
        if let Err(err) = storage.store(record.clone(), transaction.as_ref()).await {
            rollback(transaction.as_ref(), &message_id).await;
            return Err(err.into());
        }
        transaction.commit().await?;
        crate::log_outbox!(
            debug,
            "RECORD_COMMITTED",
            message_id: message_id,
            operations: record.operations.len()
        );

        let dispatched = self.dispatch_record(storage, context, &record).await?;
        Ok(ProcessingOutcome::Processed { dispatched })
    }

    /// Send the replayable operations of `record` one at a time, flagging each
    async fn dispatch_record(
        &self,
        storage: &dyn OutboxStorage,
        context: &TransportReceiveContext,
        record: &OutboxRecord,
    ) -> ProcessingResult<usize> {
        let operations = record.replay_operations();
        let count = operations.len();

        for (index, operation) in operations {
            send(context, &record.message_id, operation).await?;
            storage
                .mark_operation_dispatched(&record.message_id, index)
                .await?;
        }

        if !record.dispatched {
            storage.mark_dispatched(&record.message_id).await?;
        }
        crate::log_outbox!(
            debug,
            "RECORD_DISPATCHED",
            message_id: record.message_id,
            operations: count
        );
        Ok(count)
    }

    async fn process_without_outbox(
        &self,
        context: &mut TransportReceiveContext,
        stage: StageInvoker<'_, IncomingPhysicalContext>,
    ) -> ProcessingResult<ProcessingOutcome> {
        let message_id = context.message.message_id.clone();
        let pending = Arc::new(PendingTransportOperations::new());
        let mut physical =
            IncomingPhysicalContext::new(context.behavior_context(), (*context.message).clone());
        physical
            .behavior_context()
            .extensions()
            .set_arc(Arc::clone(&pending));

        stage.invoke(&mut physical).await?;

        let operations = pending.take();
        let dispatched = operations.len();
        for operation in operations {
            send(context, &message_id, operation).await?;
        }
        Ok(ProcessingOutcome::Processed { dispatched })
    }
}

#[async_trait]
impl StageConnector<TransportReceiveContext, IncomingPhysicalContext>
    for DeliveryConsistencyConnector
{
    #[instrument(skip_all, fields(message_id = %context.message.message_id))]
    async fn invoke(
        &self,
        context: &mut TransportReceiveContext,
        stage: StageInvoker<'_, IncomingPhysicalContext>,
    ) -> ProcessingResult<()> {
        let outcome = match self.storage.as_deref() {
            Some(storage) => self.process_with_outbox(storage, context, stage).await?,
            None => self.process_without_outbox(context, stage).await?,
        };
        context.outcome = outcome;
        Ok(())
    }
}

/// Run one operation through the dispatch chain
async fn send(
    context: &TransportReceiveContext,
    incoming_message_id: &str,
    operation: TransportOperation,
) -> ProcessingResult<()> {
    let pipelines = Arc::clone(context.behavior_context().pipelines());
    let mut dispatch = DispatchContext::new(context.behavior_context(), vec![operation]);
    pipelines
        .dispatch()
        .invoke(&mut dispatch)
        .await
        .map_err(|err| match err {
            ProcessingError::Transport(source) => ProcessingError::Dispatch {
                message_id: incoming_message_id.to_string(),
                source,
            },
            other => other,
        })
}

async fn rollback(transaction: &dyn OutboxTransaction, message_id: &str) {
    if let Err(err) = transaction.rollback().await {
        warn!(message_id = %message_id, error = %err, "outbox transaction rollback failed");
    }
}
