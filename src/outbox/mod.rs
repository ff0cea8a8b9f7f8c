//! # Outbox Storage
//!
//! Records the outgoing operations produced while processing one incoming
//! message identity, so that a redelivered envelope replays them instead of
//! running handlers again.
//!
//! The storage collaborator owns persistence. The delivery consistency
//! connector in [`crate::incoming`] drives the protocol: begin, get, store
//! inside the transaction, commit, then dispatch and mark.

mod in_memory;
mod pending;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::TransportOperation;

pub use in_memory::{InMemoryOutboxStorage, InMemoryOutboxTransaction};
pub use pending::PendingTransportOperations;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("An outbox record for message '{message_id}' already exists")]
    RecordExists { message_id: String },

    #[error("No outbox record exists for message '{message_id}'")]
    RecordNotFound { message_id: String },

    #[error("Outbox record '{message_id}' has no operation at index {index}")]
    OperationOutOfRange { message_id: String, index: usize },

    #[error("Transaction is already {state}")]
    TransactionCompleted { state: String },

    #[error("Transaction was not opened by this storage")]
    ForeignTransaction,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// One captured operation and whether it reached the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxOperation {
    pub operation: TransportOperation,
    pub dispatched: bool,
}

/// Outgoing operations of one processed incoming message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Identity of the incoming message
    pub message_id: String,
    pub operations: Vec<OutboxOperation>,
    /// All operations have been handed to the transport
    pub dispatched: bool,
    pub stored_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(message_id: impl Into<String>, operations: Vec<TransportOperation>) -> Self {
        Self {
            message_id: message_id.into(),
            operations: operations
                .into_iter()
                .map(|operation| OutboxOperation {
                    operation,
                    dispatched: false,
                })
                .collect(),
            dispatched: false,
            stored_at: Utc::now(),
        }
    }

    /// Operations to resend on redelivery, with their index in the record
    ///
    /// A fully dispatched record replays everything, since the transport tolerates
    /// identical resends. Otherwise only the operations still outstanding are replayed.
    pub fn replay_operations(&self) -> Vec<(usize, TransportOperation)> {
        self.operations
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.dispatched || !entry.dispatched)
            .map(|(index, entry)| (index, entry.operation.clone()))
            .collect()
    }

    pub fn undispatched_count(&self) -> usize {
        self.operations.iter().filter(|entry| !entry.dispatched).count()
    }
}

/// Transaction scoping one envelope's processing
#[async_trait]
pub trait OutboxTransaction: Any + Send + Sync {
    async fn commit(&self) -> Result<(), StorageError>;

    async fn rollback(&self) -> Result<(), StorageError>;

    /// Access to the concrete transaction, for storages and handlers that enlist work in it
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
pub trait OutboxStorage: Send + Sync + 'static {
    async fn begin_transaction(&self) -> Result<Arc<dyn OutboxTransaction>, StorageError>;

    async fn get(&self, message_id: &str) -> Result<Option<OutboxRecord>, StorageError>;

    /// Stage `record`; it becomes visible when `transaction` commits
    async fn store(
        &self,
        record: OutboxRecord,
        transaction: &dyn OutboxTransaction,
    ) -> Result<(), StorageError>;

    async fn mark_operation_dispatched(
        &self,
        message_id: &str,
        index: usize,
    ) -> Result<(), StorageError>;

    async fn mark_dispatched(&self, message_id: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AddressTag, Headers};

    fn operation(id: &str) -> TransportOperation {
        TransportOperation::new(id, AddressTag::unicast("billing"), Headers::new(), Vec::new())
    }

    #[test]
    fn test_replay_skips_dispatched_operations_of_open_record() {
        let mut record = OutboxRecord::new("m-1", vec![operation("a"), operation("b")]);
        record.operations[0].dispatched = true;

        let replay = record.replay_operations();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].0, 1);
        assert_eq!(record.undispatched_count(), 1);
    }

    #[test]
    fn test_replay_of_dispatched_record_resends_everything() {
        let mut record = OutboxRecord::new("m-1", vec![operation("a"), operation("b")]);
        record.dispatched = true;
        for entry in &mut record.operations {
            entry.dispatched = true;
        }
        assert_eq!(record.replay_operations().len(), 2);
    }
}
