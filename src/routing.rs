//! Unicast routing table: message type token to destination address.

use std::collections::HashMap;

use crate::config::RoutingConfig;
use crate::message::Message;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnicastRoutingTable {
    routes: HashMap<String, String>,
}

impl UnicastRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            routes: config.routes.clone(),
        }
    }

    /// Route sends of `M` to `destination`, replacing any earlier route
    pub fn route<M: Message>(&mut self, destination: impl Into<String>) -> &mut Self {
        self.add_route(M::MESSAGE_TYPE, destination)
    }

    pub fn add_route(
        &mut self,
        message_type: impl Into<String>,
        destination: impl Into<String>,
    ) -> &mut Self {
        self.routes.insert(message_type.into(), destination.into());
        self
    }

    pub fn destination_for(&self, message_type: &str) -> Option<&str> {
        self.routes.get(message_type).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
