//! Session: the explicit per-endpoint context
//!
//! A `Session` owns everything that talks to one remote server through the
//! shared channel: the correlator, the dispatch registry, connection state
//! and event fan-out. It is passed explicitly to whatever needs it; there
//! is no process-wide instance.

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Reply};
use crate::dispatch::{interpreter, DispatchRegistry, Interpreter};
use crate::error::{ClientError, Result};
use ijt_model::{Command, Envelope, InboundKind, NamespaceTable, NodeId, RelativePath};
use ijt_net_types::{Channel, ChannelEvent};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};

/// Connection state as reported by the bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// `connect to` sent, not yet answered.
    pub connecting: bool,
    pub connected: bool,
    pub session: bool,
    /// Event subscription confirmed.
    pub subscribed: bool,
    /// `terminate connection` sent.
    pub closing: bool,
}

pub struct Session {
    config: ClientConfig,
    channel: Arc<dyn Channel>,
    correlator: Arc<Correlator>,
    registry: Arc<DispatchRegistry>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<Envelope>,
}

impl Session {
    /// Create a session on `channel`. Must be called within a tokio runtime.
    pub fn new(channel: Arc<dyn Channel>, config: ClientConfig) -> Arc<Self> {
        let correlator = Arc::new(Correlator::new(
            config.endpoint.clone(),
            channel.clone(),
            config.call_timeout(),
        ));
        let registry = DispatchRegistry::new(config.endpoint.clone(), channel.clone(), correlator.clone());
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let session = Arc::new(Self { config, channel, correlator, registry, status, events });
        session.install_interpreters();
        tokio::spawn(watch_channel(Arc::downgrade(&session), session.channel.events()));
        session
    }

    fn install_interpreters(self: &Arc<Self>) {
        let me = Arc::downgrade(self);

        self.registry.register(
            InboundKind::ConnectionEstablished,
            status_change(me.clone(), |s| {
                s.connecting = false;
                s.connected = true;
            }),
        );
        self.registry.register(InboundKind::SessionEstablished, status_change(me.clone(), |s| s.session = true));
        self.registry.register(InboundKind::SubscriptionCreated, status_change(me.clone(), |s| s.subscribed = true));
        self.registry.register(
            InboundKind::SessionClosed,
            status_change(me.clone(), |s| *s = ConnectionStatus::default()),
        );

        let subscriber = me.clone();
        self.registry.register(
            InboundKind::ConnectionEstablished,
            interpreter(move |_| {
                if let Some(session) = subscriber.upgrade() {
                    if session.config.subscribe_events_on_connect {
                        session.subscribe_event(Value::Null, "on connect")?;
                    }
                }
                Ok(None)
            }),
        );

        self.registry.register(
            InboundKind::SubscribedEvent,
            interpreter(move |frame| {
                if let Some(session) = me.upgrade() {
                    // No receivers is fine.
                    let _ = session.events.send(frame.clone());
                }
                Ok(None)
            }),
        );
    }

    // ==================== Accessors ====================

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Every `event` frame for this endpoint.
    pub fn events(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    // ==================== Lifecycle ====================

    /// Ask the bridge to open a connection to the endpoint. Completion is
    /// reported through `status()`.
    pub fn connect(&self) -> Result<()> {
        self.status.send_modify(|s| s.connecting = true);
        self.send_uncorrelated(Command::ConnectTo, json!({}))
    }

    /// Wait until the bridge reports the connection as established.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut status = self.status();
        status
            .wait_for(|s| s.connected)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Cancelled)
    }

    pub fn close(&self) -> Result<()> {
        self.status.send_modify(|s| s.closing = true);
        self.send_uncorrelated(Command::TerminateConnection, json!({}))
    }

    /// Subscribe to events. `details` is echoed by the bridge for debugging.
    pub fn subscribe_event(&self, message: Value, details: &str) -> Result<()> {
        self.send_uncorrelated(Command::Subscribe, json!({ "message": message, "details": details }))
    }

    fn send_uncorrelated(&self, command: Command, payload: Value) -> Result<()> {
        tracing::debug!(command = %command, endpoint = %self.config.endpoint, "Send");
        let frame = Envelope::new(command.as_str(), self.config.endpoint.as_str(), payload);
        self.channel.send(frame).map_err(ClientError::from)
    }

    // ==================== Calls ====================

    pub async fn call(&self, command: Command, payload: Value) -> Result<Reply> {
        self.correlator.issue_call(command, payload).await
    }

    pub async fn browse(&self, id: &NodeId) -> Result<Reply> {
        let payload = json!({ "nodeid": id.to_string(), "details": self.config.browse_details });
        self.call(Command::Browse, payload).await
    }

    /// Read `attribute` (all attributes and the value when `None`).
    pub async fn read(&self, id: &NodeId, attribute: Option<&str>) -> Result<Reply> {
        self.call(Command::Read, json!({ "nodeid": id.to_string(), "attribute": attribute })).await
    }

    pub async fn path_to_id(&self, start: &NodeId, path: &RelativePath) -> Result<NodeId> {
        let reply = self
            .call(Command::PathToId, json!({ "nodeid": start.to_string(), "path": path.to_wire() }))
            .await?;
        let field = reply
            .message
            .field("nodeid")
            .cloned()
            .ok_or_else(|| ClientError::Decode("pathtoid reply without nodeid".to_string()))?;
        Ok(serde_json::from_value(field)?)
    }

    pub async fn namespaces(&self) -> Result<NamespaceTable> {
        let reply = self.call(Command::Namespaces, json!({})).await?;
        let field = reply
            .message
            .field("namespaces")
            .ok_or_else(|| ClientError::Decode("namespaces reply without namespaces".to_string()))?;
        Ok(NamespaceTable::from_payload(field)?)
    }

    /// Invoke `method` on `object`; returns the call's `output`.
    pub async fn method_call(&self, object: &NodeId, method: &NodeId, arguments: Value) -> Result<Value> {
        let payload = json!({
            "objectnode": object.to_string(),
            "methodnode": method.to_string(),
            "arguments": arguments,
        });
        let reply = self.call(Command::MethodCall, payload).await?;
        Ok(reply.message.field("output").cloned().unwrap_or(Value::Null))
    }

    /// Have the bridge build an extension object of type `node` from `parameters`.
    pub async fn construct_extension(&self, node: &NodeId, parameters: Value) -> Result<Value> {
        let payload = json!({ "nodeid": node.to_string(), "parameters": parameters });
        let reply = self.call(Command::ConstructExtension, payload).await?;
        Ok(reply.message.field("output").cloned().unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// An interpreter that applies `apply` to the connection status.
fn status_change(me: Weak<Session>, apply: fn(&mut ConnectionStatus)) -> Interpreter {
    interpreter(move |_| {
        if let Some(session) = me.upgrade() {
            session.status.send_modify(apply);
        }
        Ok(None)
    })
}

/// Reject everything outstanding when the channel drops.
async fn watch_channel(session: Weak<Session>, mut events: broadcast::Receiver<ChannelEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "Channel event receiver lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(session) = session.upgrade() else { break };
        match event {
            ChannelEvent::Connected => tracing::debug!(endpoint = %session.endpoint(), "Channel up"),
            ChannelEvent::Disconnected { reason } => {
                session.correlator.reject_all(ClientError::Disconnected(reason.clone()));
                session.status.send_replace(ConnectionStatus::default());
                tracing::warn!(endpoint = %session.endpoint(), reason = %reason, "Channel lost");
            }
        }
    }
}
