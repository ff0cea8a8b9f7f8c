//! # In-Memory Outbox Storage
//!
//! Records live in a shared `DashMap`. A transaction stages records and
//! enlisted business-state actions and applies both on commit; rollback
//! discards them. Commits are serialized by a gate shared with the storage, so
//! a transaction either applies every staged record or none of them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{OutboxRecord, OutboxStorage, OutboxTransaction, StorageError};

type EnlistedAction = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl TransactionState {
    fn as_str(self) -> &'static str {
        match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        }
    }
}

struct TransactionInner {
    state: TransactionState,
    staged: Vec<OutboxRecord>,
    enlisted: Vec<EnlistedAction>,
}

pub struct InMemoryOutboxTransaction {
    records: Arc<DashMap<String, OutboxRecord>>,
    commit_gate: Arc<Mutex<()>>,
    inner: Mutex<TransactionInner>,
}

impl InMemoryOutboxTransaction {
    fn new(records: Arc<DashMap<String, OutboxRecord>>, commit_gate: Arc<Mutex<()>>) -> Self {
        Self {
            records,
            commit_gate,
            inner: Mutex::new(TransactionInner {
                state: TransactionState::Open,
                staged: Vec::new(),
                enlisted: Vec::new(),
            }),
        }
    }

    /// Run `action` when the transaction commits; dropped on rollback
    pub fn enlist<F>(&self, action: F) -> Result<(), StorageError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.lock();
        ensure_open(inner.state)?;
        inner.enlisted.push(Box::new(action));
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == TransactionState::Open
    }

    fn stage(&self, record: OutboxRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        ensure_open(inner.state)?;
        inner.staged.push(record);
        Ok(())
    }
}

fn ensure_open(state: TransactionState) -> Result<(), StorageError> {
    match state {
        TransactionState::Open => Ok(()),
        other => Err(StorageError::TransactionCompleted {
            state: other.as_str().to_string(),
        }),
    }
}

#[async_trait]
impl OutboxTransaction for InMemoryOutboxTransaction {
    async fn commit(&self) -> Result<(), StorageError> {
        let enlisted = {
            let _gate = self.commit_gate.lock();
            let mut inner = self.inner.lock();
            ensure_open(inner.state)?;

            // Competing consumers of the same identity: the first commit wins
            let duplicate = inner
                .staged
                .iter()
                .find(|record| self.records.contains_key(&record.message_id))
                .map(|record| record.message_id.clone());
            if let Some(message_id) = duplicate {
                inner.state = TransactionState::RolledBack;
                inner.staged.clear();
                inner.enlisted.clear();
                return Err(StorageError::RecordExists { message_id });
            }

            for record in std::mem::take(&mut inner.staged) {
                if let Entry::Vacant(slot) = self.records.entry(record.message_id.clone()) {
                    slot.insert(record);
                }
            }
            inner.state = TransactionState::Committed;
            std::mem::take(&mut inner.enlisted)
        };

        for action in enlisted {
            action();
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        ensure_open(inner.state)?;
        inner.state = TransactionState::RolledBack;
        inner.staged.clear();
        inner.enlisted.clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for InMemoryOutboxTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InMemoryOutboxTransaction")
            .field("state", &inner.state)
            .field("staged", &inner.staged.len())
            .field("enlisted", &inner.enlisted.len())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOutboxStorage {
    records: Arc<DashMap<String, OutboxRecord>>,
    commit_gate: Arc<Mutex<()>>,
}

impl fmt::Debug for InMemoryOutboxStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryOutboxStorage")
            .field("records", &self.records.len())
            .finish()
    }
}

impl InMemoryOutboxStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `message_id`
    pub fn record(&self, message_id: &str) -> Option<OutboxRecord> {
        self.records.get(message_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop fully dispatched records, returning how many were removed
    pub fn purge_dispatched(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.dispatched);
        before - self.records.len()
    }
}

#[async_trait]
impl OutboxStorage for InMemoryOutboxStorage {
    async fn begin_transaction(&self) -> Result<Arc<dyn OutboxTransaction>, StorageError> {
        Ok(Arc::new(InMemoryOutboxTransaction::new(
            Arc::clone(&self.records),
            Arc::clone(&self.commit_gate),
        )))
    }

    async fn get(&self, message_id: &str) -> Result<Option<OutboxRecord>, StorageError> {
        Ok(self.record(message_id))
    }

    async fn store(
        &self,
        record: OutboxRecord,
        transaction: &dyn OutboxTransaction,
    ) -> Result<(), StorageError> {
        let transaction = transaction
            .as_any()
            .downcast_ref::<InMemoryOutboxTransaction>()
            .ok_or(StorageError::ForeignTransaction)?;
        if !Arc::ptr_eq(&transaction.records, &self.records) {
            return Err(StorageError::ForeignTransaction);
        }
        transaction.stage(record)
    }

    async fn mark_operation_dispatched(
        &self,
        message_id: &str,
        index: usize,
    ) -> Result<(), StorageError> {
        let mut record =
            self.records
                .get_mut(message_id)
                .ok_or_else(|| StorageError::RecordNotFound {
                    message_id: message_id.to_string(),
                })?;
        let entry = record
            .operations
            .get_mut(index)
            .ok_or_else(|| StorageError::OperationOutOfRange {
                message_id: message_id.to_string(),
                index,
            })?;
        entry.dispatched = true;
        Ok(())
    }

    async fn mark_dispatched(&self, message_id: &str) -> Result<(), StorageError> {
        let mut record =
            self.records
                .get_mut(message_id)
                .ok_or_else(|| StorageError::RecordNotFound {
                    message_id: message_id.to_string(),
                })?;
        record.dispatched = true;
        for entry in &mut record.operations {
            entry.dispatched = true;
        }
        Ok(())
    }
}
