use parking_lot::Mutex;

use crate::message::TransportOperation;

/// Operations captured inside a delivery consistency scope, awaiting commit
#[derive(Debug, Default)]
pub struct PendingTransportOperations {
    operations: Mutex<Vec<TransportOperation>>,
}

impl PendingTransportOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, operation: TransportOperation) {
        self.operations.lock().push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }

    /// Remove and return everything captured so far, in capture order
    pub fn take(&self) -> Vec<TransportOperation> {
        std::mem::take(&mut *self.operations.lock())
    }
}
