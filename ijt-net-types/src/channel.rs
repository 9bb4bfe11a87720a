//! Channel abstraction for the bridge connection
//!
//! One channel multiplexes every request and reply of every remote server
//! the bridge talks to. Production uses `WsChannel` (ijt-net-ws);
//! tests use the in-memory `SimBridge` (ijt-net-sim).

use ijt_model::Envelope;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every inbound frame matching a subscription.
///
/// Listeners run on the channel's reader task and must not block.
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Box a closure as a `Listener`.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Error type for channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Connectivity changes reported by a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
}

/// Shared duplex message channel to the bridge.
///
/// `send` only queues the frame; delivery failures after queueing surface as
/// a `ChannelEvent::Disconnected`.
pub trait Channel: Send + Sync + fmt::Debug + 'static {
    /// Queue an outbound request frame.
    fn send(&self, frame: Envelope) -> Result<(), ChannelError>;

    /// Register a listener for inbound frames tagged with `endpoint` and `command`.
    fn listen(&self, endpoint: &str, command: &str, listener: Listener);

    /// Number of listeners registered for `(endpoint, command)`.
    fn listener_count(&self, endpoint: &str, command: &str) -> usize;

    /// Get a stream of connectivity events.
    fn events(&self) -> tokio::sync::broadcast::Receiver<ChannelEvent>;

    /// Whether the channel can still carry frames.
    fn is_open(&self) -> bool;
}
