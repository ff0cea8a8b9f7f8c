#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Message-bus pipeline engine: an extensible, multi-stage processing
//! pipeline that transforms, routes, audits and dispatches messages, and
//! delivers each incoming message to application handlers exactly once over an
//! at-least-once transport.
//!
//! ## Architecture
//!
//! Every message passes through typed stages. Each stage has its own context
//! type and an ordered chain of behaviors; connectors terminate one chain and
//! invoke the next stage's chain.
//!
//! ```text
//! TransportReceive -> IncomingPhysical -> IncomingLogical -> InvokeHandler
//!                                                            |
//!       Dispatch <- OutgoingPhysical <- OutgoingLogical <----+  (send / publish / reply)
//! ```
//!
//! Chains are assembled once at startup from declarative step registrations
//! with before/after constraints ([`pipeline`]). The connector of the transport
//! receive stage ([`incoming::DeliveryConsistencyConnector`]) wraps handler
//! execution in an outbox transaction so redelivered messages replay their
//! outgoing operations instead of running handlers again ([`outbox`]).
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Step registration, dependency resolution, chain assembly and execution
//! - [`context`] - Stage contexts and the hierarchical extension bag
//! - [`incoming`] - Delivery consistency, deserialization, handler invocation, audit
//! - [`outgoing`] - Routing, serialization, causation headers, dispatch
//! - [`outbox`] - Outbox records, storage and transactions
//! - [`endpoint`] - Builder wiring the core steps and the running endpoint
//! - [`config`] - Layered configuration
//! - [`error`] - Top-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use courier_core::config::CourierConfig;
//! use courier_core::endpoint::EndpointBuilder;
//! use courier_core::handlers::{HandleMessages, MessageHandlerContext};
//! use courier_core::message::Message;
//! use courier_core::outbox::InMemoryOutboxStorage;
//! use courier_core::pipeline::HandlerError;
//! use courier_core::transport::InMemoryTransport;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct OrderPlaced { order_id: u64 }
//!
//! impl Message for OrderPlaced {
//!     const MESSAGE_TYPE: &'static str = "Sales.OrderPlaced";
//! }
//!
//! struct OrderPlacedHandler;
//!
//! #[async_trait]
//! impl HandleMessages<OrderPlaced> for OrderPlacedHandler {
//!     async fn handle(&self, message: &OrderPlaced, _context: &mut MessageHandlerContext)
//!         -> Result<(), HandlerError> {
//!         println!("order {} placed", message.order_id);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> courier_core::Result<()> {
//! let endpoint = EndpointBuilder::new(CourierConfig::default(), Arc::new(InMemoryTransport::new("sales")))
//!     .with_outbox_storage(Arc::new(InMemoryOutboxStorage::new()))
//!     .register_handler::<OrderPlaced, _>(OrderPlacedHandler)
//!     .build()?;
//!
//! endpoint.receive_once().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod incoming;
pub mod logging;
pub mod message;
pub mod outbox;
pub mod outgoing;
pub mod pipeline;
pub mod routing;
pub mod serialization;
pub mod transport;

pub use config::{ConfigLoader, CourierConfig};
pub use context::ProcessingOutcome;
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{CourierError, Result};
pub use handlers::{HandleMessages, MessageHandlerContext};
pub use message::{IncomingEnvelope, Message, TransportOperation};
pub use pipeline::{
    Behavior, Next, PipelineConfigurationError, ProcessingError, RegisterStep, ReplaceStep, Stage,
    StageConnector, StageInvoker,
};
