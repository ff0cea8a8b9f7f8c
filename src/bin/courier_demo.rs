//! # Courier Demo
//!
//! Runs an in-memory endpoint end to end: an order is placed, its handler
//! bills it by sending a follow-up command, and the same envelope is then
//! redelivered to show that the outbox replays the captured send instead of
//! running the handler twice.
//!
//! Configuration is loaded from `config/courier.toml` when present and from
//! `COURIER__*` environment variables.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use courier_core::config::ConfigLoader;
use courier_core::constants::headers;
use courier_core::logging::init_structured_logging;
use courier_core::message::{Headers, IncomingEnvelope};
use courier_core::outbox::InMemoryOutboxStorage;
use courier_core::pipeline::HandlerError;
use courier_core::transport::InMemoryTransport;
use courier_core::{EndpointBuilder, HandleMessages, Message, MessageHandlerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u64,
    amount_cents: u64,
}

impl Message for OrderPlaced {
    const MESSAGE_TYPE: &'static str = "Sales.OrderPlaced";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BillOrder {
    order_id: u64,
    amount_cents: u64,
}

impl Message for BillOrder {
    const MESSAGE_TYPE: &'static str = "Billing.BillOrder";
}

#[derive(Default)]
struct OrderPlacedHandler {
    invocations: AtomicUsize,
}

#[async_trait]
impl HandleMessages<OrderPlaced> for OrderPlacedHandler {
    async fn handle(
        &self,
        message: &OrderPlaced,
        context: &mut MessageHandlerContext,
    ) -> Result<(), HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(order_id = message.order_id, "billing order");
        context
            .send(BillOrder {
                order_id: message.order_id,
                amount_cents: message.amount_cents,
            })
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("failed to load courier configuration")?;
    init_structured_logging(&config.logging);

    let transport = Arc::new(InMemoryTransport::new(config.endpoint.local_address()));
    let storage = Arc::new(InMemoryOutboxStorage::new());
    let handler = Arc::new(OrderPlacedHandler::default());

    let endpoint = EndpointBuilder::new(config, transport.clone())
        .with_outbox_storage(storage.clone())
        .register_shared_handler::<OrderPlaced, _>(Arc::clone(&handler))
        .route::<BillOrder>("billing")
        .build()
        .context("failed to build endpoint")?;

    let mut map = Headers::new();
    map.insert(
        headers::ENCLOSED_MESSAGE_TYPES.to_string(),
        OrderPlaced::MESSAGE_TYPE.to_string(),
    );
    let body = serde_json::to_vec(&OrderPlaced {
        order_id: 42,
        amount_cents: 1999,
    })?;
    let envelope = IncomingEnvelope::new("m-1", map, body);

    transport.enqueue(envelope.clone());
    transport.enqueue(envelope);

    while let Some(outcome) = endpoint.receive_once().await? {
        println!("processed m-1: {outcome:?}");
    }

    println!(
        "handler invocations: {}, operations dispatched: {}, outbox records: {}",
        handler.invocations.load(Ordering::SeqCst),
        transport.dispatched().len(),
        storage.len()
    );
    Ok(())
}
