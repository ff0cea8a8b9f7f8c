//! # Incoming Pipeline
//!
//! Behaviors and connectors of the incoming stages:
//!
//! ```text
//! TransportReceive: DeliveryConsistencyConnector
//! IncomingPhysical: MutateIncomingTransportMessage -> AuditProcessedMessage -> DeserializeLogicalMessagesConnector
//! IncomingLogical:  LoadHandlersConnector
//! InvokeHandler:    InvokeHandlers
//! ```

mod audit;
mod delivery;
mod deserialize;
mod handlers;
mod mutate;

pub use audit::AuditProcessedMessageBehavior;
pub use delivery::DeliveryConsistencyConnector;
pub use deserialize::DeserializeLogicalMessagesConnector;
pub use handlers::{InvokeHandlerTerminator, LoadHandlersConnector};
pub use mutate::{MutateIncomingTransportMessage, MutateIncomingTransportMessageBehavior};
