//! Messages, handlers and endpoint wiring shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use courier_core::config::CourierConfig;
use courier_core::constants::headers;
use courier_core::endpoint::{Endpoint, EndpointBuilder};
use courier_core::handlers::{HandleMessages, MessageHandlerContext};
use courier_core::message::{Headers, IncomingEnvelope, Message};
use courier_core::outbox::InMemoryOutboxStorage;
use courier_core::pipeline::HandlerError;
use courier_core::transport::InMemoryTransport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u64,
}

impl Message for OrderPlaced {
    const MESSAGE_TYPE: &'static str = "Sales.OrderPlaced";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillOrder {
    pub order_id: u64,
}

impl Message for BillOrder {
    const MESSAGE_TYPE: &'static str = "Billing.BillOrder";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: u64,
}

impl Message for OrderAccepted {
    const MESSAGE_TYPE: &'static str = "Sales.OrderAccepted";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeA {
    pub value: u32,
}

impl Message for TypeA {
    const MESSAGE_TYPE: &'static str = "Tests.TypeA";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeB {
    pub value: u32,
}

impl Message for TypeB {
    const MESSAGE_TYPE: &'static str = "Tests.TypeB";
}

/// Ordered record of what the handlers observed
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }
}

/// What the order handler does after recording its invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderReaction {
    Nothing,
    SendBill,
    SendTwoBills,
    Reply,
    SendImmediatelyThenFail,
}

/// Handles `OrderPlaced`, failing the first `failures` invocations
pub struct OrderPlacedHandler {
    pub log: EventLog,
    pub invocations: AtomicUsize,
    failures: AtomicUsize,
    reaction: OrderReaction,
}

impl OrderPlacedHandler {
    pub fn new(log: EventLog, reaction: OrderReaction) -> Self {
        Self {
            log,
            invocations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            reaction,
        }
    }

    pub fn failing(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandleMessages<OrderPlaced> for OrderPlacedHandler {
    async fn handle(
        &self,
        message: &OrderPlaced,
        context: &mut MessageHandlerContext,
    ) -> Result<(), HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("OrderPlaced:{}", message.order_id));

        let bill = BillOrder {
            order_id: message.order_id,
        };
        match self.reaction {
            OrderReaction::Nothing => {}
            OrderReaction::SendBill => {
                context.send(bill).await?;
            }
            OrderReaction::SendTwoBills => {
                context.send(bill.clone()).await?;
                context.send(bill).await?;
            }
            OrderReaction::Reply => {
                context
                    .reply(OrderAccepted {
                        order_id: message.order_id,
                    })
                    .await?;
            }
            OrderReaction::SendImmediatelyThenFail => {
                context
                    .send_with(
                        bill,
                        courier_core::outgoing::SendOptions::new().requires_immediate_dispatch(),
                    )
                    .await?;
                return Err("failed after immediate send".into());
            }
        }

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err("simulated handler failure".into());
        }
        Ok(())
    }
}

/// Records the start and end of each `TypeA` and `TypeB` message
pub struct SequenceHandler {
    pub log: EventLog,
}

#[async_trait]
impl HandleMessages<TypeA> for SequenceHandler {
    async fn handle(&self, message: &TypeA, _: &mut MessageHandlerContext) -> Result<(), HandlerError> {
        self.log.push(format!("A:{}:start", message.value));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.log.push(format!("A:{}:end", message.value));
        Ok(())
    }
}

#[async_trait]
impl HandleMessages<TypeB> for SequenceHandler {
    async fn handle(&self, message: &TypeB, _: &mut MessageHandlerContext) -> Result<(), HandlerError> {
        self.log.push(format!("B:{}:start", message.value));
        tokio::task::yield_now().await;
        self.log.push(format!("B:{}:end", message.value));
        Ok(())
    }
}

pub fn envelope(message_id: &str, enclosed_types: &str, body: &[u8]) -> IncomingEnvelope {
    let mut map = Headers::new();
    map.insert(
        headers::ENCLOSED_MESSAGE_TYPES.to_string(),
        enclosed_types.to_string(),
    );
    IncomingEnvelope::new(message_id, map, body.to_vec())
}

pub fn order_placed_envelope(message_id: &str, order_id: u64) -> IncomingEnvelope {
    let body = serde_json::to_vec(&OrderPlaced { order_id }).unwrap();
    envelope(message_id, OrderPlaced::MESSAGE_TYPE, &body)
}

pub fn with_header(mut envelope: IncomingEnvelope, key: &str, value: &str) -> IncomingEnvelope {
    envelope.headers.insert(key.to_string(), value.to_string());
    envelope
}

/// An endpoint over in-memory collaborators
pub struct TestEndpoint {
    pub endpoint: Endpoint,
    pub transport: Arc<InMemoryTransport>,
    pub storage: Arc<InMemoryOutboxStorage>,
}

pub fn test_config() -> CourierConfig {
    let mut config = CourierConfig::default();
    config.endpoint.name = "sales".to_string();
    config
        .routing
        .routes
        .insert(BillOrder::MESSAGE_TYPE.to_string(), "billing".to_string());
    config
}

pub fn build_endpoint<F>(config: CourierConfig, configure: F) -> TestEndpoint
where
    F: FnOnce(EndpointBuilder) -> EndpointBuilder,
{
    let transport = Arc::new(InMemoryTransport::new("sales"));
    let storage = Arc::new(InMemoryOutboxStorage::new());
    let builder = EndpointBuilder::new(config, transport.clone()).with_outbox_storage(storage.clone());
    let endpoint = configure(builder).build().expect("endpoint should build");

    TestEndpoint {
        endpoint,
        transport,
        storage,
    }
}

/// Endpoint with one `OrderPlacedHandler` reacting as requested
pub fn order_endpoint(handler: Arc<OrderPlacedHandler>) -> TestEndpoint {
    build_endpoint(test_config(), |builder| {
        builder.register_shared_handler::<OrderPlaced, _>(handler)
    })
}
