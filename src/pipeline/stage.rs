//! The closed set of context stages, each owning one chain.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Raw envelope as delivered by the transport
    TransportReceive,
    /// Envelope inside the delivery consistency scope
    IncomingPhysical,
    /// One deserialized message of an envelope
    IncomingLogical,
    /// One handler invocation for one logical message
    InvokeHandler,
    /// A send, publish or reply issued by application code
    OutgoingLogical,
    /// The serialized form of an outgoing message
    OutgoingPhysical,
    /// Operations handed to the transport
    Dispatch,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::TransportReceive,
        Stage::IncomingPhysical,
        Stage::IncomingLogical,
        Stage::InvokeHandler,
        Stage::OutgoingLogical,
        Stage::OutgoingPhysical,
        Stage::Dispatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TransportReceive => "TransportReceive",
            Stage::IncomingPhysical => "IncomingPhysical",
            Stage::IncomingLogical => "IncomingLogical",
            Stage::InvokeHandler => "InvokeHandler",
            Stage::OutgoingLogical => "OutgoingLogical",
            Stage::OutgoingPhysical => "OutgoingPhysical",
            Stage::Dispatch => "Dispatch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
