use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};

use courier_core::constants::headers;
use courier_core::message::Headers;
use courier_core::outbox::InMemoryOutboxStorage;
use courier_core::pipeline::{resolve_order, HandlerError, RegisterStep, Stage};
use courier_core::transport::InMemoryTransport;
use courier_core::{
    CourierConfig, EndpointBuilder, HandleMessages, IncomingEnvelope, Message,
    MessageHandlerContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    sequence: u64,
}

impl Message for Ping {
    const MESSAGE_TYPE: &'static str = "Bench.Ping";
}

struct PingHandler;

#[async_trait]
impl HandleMessages<Ping> for PingHandler {
    async fn handle(&self, message: &Ping, _: &mut MessageHandlerContext) -> Result<(), HandlerError> {
        black_box(message.sequence);
        Ok(())
    }
}

fn ping_envelope(sequence: u64) -> IncomingEnvelope {
    let mut map = Headers::new();
    map.insert(headers::ENCLOSED_MESSAGE_TYPES.to_string(), Ping::MESSAGE_TYPE.to_string());
    let body = serde_json::to_vec(&Ping { sequence }).unwrap_or_default();
    IncomingEnvelope::new(format!("ping-{sequence}"), map, body)
}

fn benchmark_resolve_order(c: &mut Criterion) {
    let steps: Vec<RegisterStep> = (0..64)
        .map(|i| {
            let step = RegisterStep::of_type::<
                courier_core::context::OutgoingPhysicalContext,
                courier_core::outgoing::AttachCausationHeadersBehavior,
            >(format!("Step{i}"), "bench step");
            if i > 0 {
                step.insert_after(format!("Step{}", i - 1))
            } else {
                step
            }
        })
        .rev()
        .collect();

    c.bench_function("resolve_order_64_chained_steps", |b| {
        b.iter(|| resolve_order(Stage::OutgoingPhysical, black_box(&steps)))
    });
}

fn benchmark_process_envelope(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for (name, with_outbox) in [("process_envelope_outbox", true), ("process_envelope_pass_through", false)] {
        let transport = Arc::new(InMemoryTransport::new("bench"));
        let mut builder = EndpointBuilder::new(CourierConfig::default(), transport)
            .register_handler::<Ping, _>(PingHandler);
        if with_outbox {
            builder = builder.with_outbox_storage(Arc::new(InMemoryOutboxStorage::new()));
        }
        let endpoint = builder.build().unwrap();
        let sequence = AtomicU64::new(0);

        c.bench_function(name, |b| {
            b.iter(|| {
                let envelope = ping_envelope(sequence.fetch_add(1, Ordering::Relaxed));
                runtime.block_on(endpoint.process(envelope))
            })
        });
    }
}

criterion_group!(benches, benchmark_resolve_order, benchmark_process_envelope);
criterion_main!(benches);
