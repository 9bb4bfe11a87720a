//! Client configuration
//!
//! Deserializable so an embedding application can keep it in its own
//! config file; every field has a default.

use ijt_model::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:40451";
const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the remote server, as the bridge knows it. Also the
    /// endpoint tag on every frame.
    pub endpoint: String,
    /// Per-call timeout in milliseconds. `None` waits forever.
    pub call_timeout_ms: Option<u64>,
    /// Ask the bridge for full reference descriptions when browsing.
    pub browse_details: bool,
    pub root: NodeId,
    pub objects_folder: NodeId,
    /// Identifier of the type definition that marks the joining system
    /// below the objects folder.
    pub system_type_definition: String,
    /// Buffer size of the event and new-node broadcast channels.
    pub event_capacity: usize,
    /// Send an event subscription as soon as the connection is established.
    pub subscribe_events_on_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            call_timeout_ms: None,
            browse_details: true,
            root: NodeId::numeric(0, 84),
            objects_folder: NodeId::numeric(0, 85),
            system_type_definition: "1005".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            subscribe_events_on_connect: true,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_browse_details(mut self, details: bool) -> Self {
        self.browse_details = details;
        self
    }

    pub fn with_system_type_definition(mut self, identifier: impl Into<String>) -> Self {
        self.system_type_definition = identifier.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_subscribe_on_connect(mut self, subscribe: bool) -> Self {
        self.subscribe_events_on_connect = subscribe;
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
