//! Physical message shapes: the incoming envelope handed over by the transport and
//! the outgoing operation handed back to it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::headers;

/// Flat string-to-string header map
pub type Headers = HashMap<String, String>;

/// Why a message was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageIntent {
    Send,
    Publish,
    Reply,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageIntent::Send => "Send",
            MessageIntent::Publish => "Publish",
            MessageIntent::Reply => "Reply",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Send" => Some(MessageIntent::Send),
            "Publish" => Some(MessageIntent::Publish),
            "Reply" => Some(MessageIntent::Reply),
            _ => None,
        }
    }
}

impl fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical transport message before deserialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEnvelope {
    /// Transport- or caller-assigned identity
    pub message_id: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl IncomingEnvelope {
    pub fn new(message_id: impl Into<String>, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            headers,
            body,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Intent declared by the sender; absent or unknown values read as `None`
    pub fn intent(&self) -> Option<MessageIntent> {
        self.header(headers::MESSAGE_INTENT)
            .and_then(MessageIntent::parse)
    }

    pub fn is_broadcast(&self) -> bool {
        self.intent() == Some(MessageIntent::Publish)
    }

    pub fn has_empty_body(&self) -> bool {
        self.body.is_empty()
    }
}

/// Where an outgoing operation is delivered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressTag {
    /// A single queue
    Unicast { address: String },
    /// Every subscriber of a message type; topology is the transport's concern
    Multicast { message_type: String },
}

impl AddressTag {
    pub fn unicast(address: impl Into<String>) -> Self {
        AddressTag::Unicast {
            address: address.into(),
        }
    }

    pub fn multicast(message_type: impl Into<String>) -> Self {
        AddressTag::Multicast {
            message_type: message_type.into(),
        }
    }
}

impl fmt::Display for AddressTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressTag::Unicast { address } => write!(f, "unicast:{address}"),
            AddressTag::Multicast { message_type } => write!(f, "multicast:{message_type}"),
        }
    }
}

/// An outgoing physical message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOperation {
    pub message_id: String,
    pub destination: AddressTag,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl TransportOperation {
    pub fn new(
        message_id: impl Into<String>,
        destination: AddressTag,
        headers: Headers,
        body: Vec<u8>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            destination,
            headers,
            body,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Convert into the envelope a receiving endpoint would observe
    pub fn into_envelope(self) -> IncomingEnvelope {
        IncomingEnvelope::new(self.message_id, self.headers, self.body)
    }
}
