//! # In-Memory Transport
//!
//! Lock-free input queue plus a record of every dispatched operation, for
//! tests and local development. Dispatch failures can be injected to exercise
//! post-commit recovery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tracing::debug;

use super::{Transport, TransportError};
use crate::message::{AddressTag, IncomingEnvelope, TransportOperation};

#[derive(Debug)]
pub struct InMemoryTransport {
    name: String,
    input: SegQueue<IncomingEnvelope>,
    /// Received but unsettled copies per message id
    in_flight: Mutex<HashMap<String, usize>>,
    dispatched: Mutex<Vec<TransportOperation>>,
    /// Number of upcoming dispatch calls that fail
    failing_dispatches: AtomicUsize,
    total_received: AtomicU64,
    total_completed: AtomicU64,
    total_abandoned: AtomicU64,
}

impl InMemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: SegQueue::new(),
            in_flight: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(Vec::new()),
            failing_dispatches: AtomicUsize::new(0),
            total_received: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_abandoned: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Place an envelope on the input queue
    pub fn enqueue(&self, envelope: IncomingEnvelope) {
        self.input.push(envelope);
    }

    pub fn pending_len(&self) -> usize {
        self.input.len()
    }

    /// Make the next `count` dispatch calls fail
    pub fn fail_next_dispatches(&self, count: usize) {
        self.failing_dispatches.store(count, Ordering::SeqCst);
    }

    /// Every operation dispatched so far, in dispatch order
    pub fn dispatched(&self) -> Vec<TransportOperation> {
        self.dispatched.lock().clone()
    }

    pub fn dispatched_to(&self, destination: &AddressTag) -> Vec<TransportOperation> {
        self.dispatched
            .lock()
            .iter()
            .filter(|operation| &operation.destination == destination)
            .cloned()
            .collect()
    }

    /// Drain the dispatch record
    pub fn take_dispatched(&self) -> Vec<TransportOperation> {
        std::mem::take(&mut *self.dispatched.lock())
    }

    pub fn total_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::Relaxed)
    }

    pub fn total_abandoned(&self) -> u64 {
        self.total_abandoned.load(Ordering::Relaxed)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().values().sum()
    }

    /// Settle one in-flight copy of `message_id`
    fn settle(&self, message_id: &str) -> Result<(), TransportError> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get_mut(message_id) {
            Some(copies) if *copies > 1 => *copies -= 1,
            Some(_) => {
                in_flight.remove(message_id);
            }
            None => {
                return Err(TransportError::NotInFlight {
                    message_id: message_id.to_string(),
                })
            }
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_dispatches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn receive(&self) -> Result<Option<IncomingEnvelope>, TransportError> {
        let Some(envelope) = self.input.pop() else {
            return Ok(None);
        };
        *self
            .in_flight
            .lock()
            .entry(envelope.message_id.clone())
            .or_insert(0) += 1;
        self.total_received.fetch_add(1, Ordering::Relaxed);
        Ok(Some(envelope))
    }

    async fn complete(&self, message_id: &str) -> Result<(), TransportError> {
        self.settle(message_id)?;
        self.total_completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn abandon(&self, envelope: IncomingEnvelope) -> Result<(), TransportError> {
        self.settle(&envelope.message_id)?;
        self.total_abandoned.fetch_add(1, Ordering::Relaxed);
        self.input.push(envelope);
        Ok(())
    }

    async fn dispatch(&self, operation: &TransportOperation) -> Result<(), TransportError> {
        if self.take_injected_failure() {
            return Err(TransportError::dispatch_failed(operation, "injected failure"));
        }
        debug!(
            transport = %self.name,
            message_id = %operation.message_id,
            destination = %operation.destination,
            "dispatched operation"
        );
        self.dispatched.lock().push(operation.clone());
        Ok(())
    }
}
