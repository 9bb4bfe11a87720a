//! Frames exchanged with the bridge
//!
//! Requests go out as flat JSON objects:
//! `{"command": "browse", "endpoint": "opc.tcp://...", "uniqueid": 7, "nodeid": "ns=0;i=84", "details": true}`.
//!
//! Replies and notifications come back with the payload nested under `data`:
//! `{"command": "browseresult", "endpoint": "opc.tcp://...", "uniqueid": 7, "data": {...}}`.
//! A failed call carries `data.exception`.

use crate::types::CallId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Endpoint tag used when a frame is not addressed to a specific remote server.
pub const COMMON_ENDPOINT: &str = "common";

/// Outbound operations understood by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Browse,
    Read,
    PathToId,
    MethodCall,
    Subscribe,
    ConstructExtension,
    Namespaces,
    ConnectTo,
    TerminateConnection,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Browse => "browse",
            Command::Read => "read",
            Command::PathToId => "pathtoid",
            Command::MethodCall => "methodcall",
            Command::Subscribe => "subscribe",
            Command::ConstructExtension => "constructextension",
            Command::Namespaces => "namespaces",
            Command::ConnectTo => "connect to",
            Command::TerminateConnection => "terminate connection",
        }
    }

    /// The inbound kind that carries the reply to this command.
    pub fn reply_kind(self) -> InboundKind {
        match self {
            Command::Browse => InboundKind::BrowseResult,
            Command::Read => InboundKind::ReadResult,
            Command::PathToId => InboundKind::PathToIdResult,
            Command::MethodCall => InboundKind::CallResult,
            Command::Subscribe => InboundKind::SubscriptionCreated,
            Command::ConstructExtension => InboundKind::ConstructExtensionResult,
            Command::Namespaces => InboundKind::Namespaces,
            Command::ConnectTo => InboundKind::ConnectionEstablished,
            Command::TerminateConnection => InboundKind::SessionClosed,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Command; 9] = [
            Command::Browse,
            Command::Read,
            Command::PathToId,
            Command::MethodCall,
            Command::Subscribe,
            Command::ConstructExtension,
            Command::Namespaces,
            Command::ConnectTo,
            Command::TerminateConnection,
        ];
        ALL.into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown command '{}'", s))
    }
}

/// Inbound message kinds sent by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundKind {
    BrowseResult,
    ReadResult,
    PathToIdResult,
    CallResult,
    ConstructExtensionResult,
    Namespaces,
    SubscribedEvent,
    ConnectionEstablished,
    SessionEstablished,
    SubscriptionCreated,
    SessionClosed,
    ErrorMessage,
}

impl InboundKind {
    pub const ALL: [InboundKind; 12] = [
        InboundKind::BrowseResult,
        InboundKind::ReadResult,
        InboundKind::PathToIdResult,
        InboundKind::CallResult,
        InboundKind::ConstructExtensionResult,
        InboundKind::Namespaces,
        InboundKind::SubscribedEvent,
        InboundKind::ConnectionEstablished,
        InboundKind::SessionEstablished,
        InboundKind::SubscriptionCreated,
        InboundKind::SessionClosed,
        InboundKind::ErrorMessage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InboundKind::BrowseResult => "browseresult",
            InboundKind::ReadResult => "readresult",
            InboundKind::PathToIdResult => "pathtoidresult",
            InboundKind::CallResult => "callresult",
            InboundKind::ConstructExtensionResult => "constructextensionresult",
            InboundKind::Namespaces => "namespaces",
            InboundKind::SubscribedEvent => "event",
            InboundKind::ConnectionEstablished => "connection established",
            InboundKind::SessionEstablished => "session established",
            InboundKind::SubscriptionCreated => "subscribe",
            InboundKind::SessionClosed => "session closed",
            InboundKind::ErrorMessage => "error",
        }
    }
}

impl fmt::Display for InboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboundKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InboundKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown message kind '{}'", s))
    }
}

/// One frame on the shared channel, in either direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub command: String,
    pub endpoint: String,
    pub call_id: Option<CallId>,
    /// Request arguments (outbound) or reply payload (inbound).
    pub data: Value,
}

#[derive(Serialize, Deserialize)]
struct ReplyFrame {
    command: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uniqueid: Option<CallId>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    pub fn new(command: impl Into<String>, endpoint: impl Into<String>, data: Value) -> Self {
        Self { command: command.into(), endpoint: endpoint.into(), call_id: None, data }
    }

    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = Some(call_id);
        self
    }

    /// The inbound kind, if the command names one.
    pub fn kind(&self) -> Option<InboundKind> {
        self.command.parse().ok()
    }

    /// Remote failure text carried in `data.exception`.
    pub fn exception(&self) -> Option<&str> {
        match self.data.get("exception")? {
            Value::Null => None,
            Value::String(s) => Some(s.as_str()),
            _ => Some("remote exception"),
        }
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Encode as a flat request frame.
    pub fn encode_request(&self) -> String {
        let mut map = match &self.data {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            other => {
                let mut m = Map::new();
                m.insert("data".to_string(), other.clone());
                m
            }
        };
        map.insert("command".to_string(), Value::String(self.command.clone()));
        map.insert("endpoint".to_string(), Value::String(self.endpoint.clone()));
        if let Some(id) = self.call_id {
            map.insert("uniqueid".to_string(), Value::from(id.0));
        }
        Value::Object(map).to_string()
    }

    /// Decode a flat request frame.
    pub fn decode_request(text: &str) -> Result<Self, serde_json::Error> {
        let mut map: Map<String, Value> = serde_json::from_str(text)?;
        let command: String = serde_json::from_value(map.remove("command").unwrap_or(Value::Null))?;
        let endpoint = match map.remove("endpoint") {
            Some(Value::String(s)) => s,
            _ => COMMON_ENDPOINT.to_string(),
        };
        let call_id = match map.remove("uniqueid") {
            None | Some(Value::Null) => None,
            Some(v) => Some(serde_json::from_value(v)?),
        };
        Ok(Self { command, endpoint, call_id, data: Value::Object(map) })
    }

    /// Encode as a reply frame with the payload under `data`.
    pub fn encode_reply(&self) -> String {
        let frame = ReplyFrame {
            command: self.command.clone(),
            endpoint: Some(self.endpoint.clone()),
            uniqueid: self.call_id,
            data: self.data.clone(),
        };
        serde_json::to_string(&frame).unwrap_or_default()
    }

    /// Decode a reply frame.
    pub fn decode_reply(text: &str) -> Result<Self, serde_json::Error> {
        let frame: ReplyFrame = serde_json::from_str(text)?;
        Ok(Self {
            command: frame.command,
            endpoint: frame.endpoint.unwrap_or_else(|| COMMON_ENDPOINT.to_string()),
            // The bridge echoes a zero id for uncorrelated frames.
            call_id: frame.uniqueid.filter(|id| id.0 != 0),
            data: frame.data,
        })
    }
}
