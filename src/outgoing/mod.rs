//! # Outgoing Pipeline
//!
//! Behaviors and connectors of the outgoing stages:
//!
//! ```text
//! OutgoingLogical:  UnicastRouting -> SerializeMessageConnector
//! OutgoingPhysical: MutateOutgoingTransportMessage -> AttachCausationHeaders -> RoutingToDispatchConnector
//! Dispatch:         ImmediateDispatch
//! ```

mod causation;
mod dispatch;
mod mutate;
mod operations;
mod routing;
mod serialize;

pub use causation::AttachCausationHeadersBehavior;
pub(crate) use dispatch::capture_or_dispatch;
pub use dispatch::{ImmediateDispatchTerminator, RoutingToDispatchConnector};
pub use mutate::{
    MutateOutgoingTransportMessage, MutateOutgoingTransportMessageBehavior,
    OutgoingTransportMessage,
};
pub use operations::{MessageOperations, PublishOptions, ReplyOptions, SendOptions};
pub use routing::UnicastRoutingBehavior;
pub use serialize::SerializeMessageConnector;
