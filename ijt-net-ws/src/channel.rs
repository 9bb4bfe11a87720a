//! WsChannel: Channel implementation over tokio-tungstenite
//!
//! One writer task drains the outbound queue into the socket; one reader
//! task decodes inbound text frames and routes them through the listener
//! table. Either task ending closes the channel and reports
//! `ChannelEvent::Disconnected`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ijt_model::Envelope;
use ijt_net_types::{Channel, ChannelError, ChannelEvent, Listener, ListenerTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 16;

struct Inner {
    outbound: mpsc::UnboundedSender<String>,
    listeners: ListenerTable,
    events: broadcast::Sender<ChannelEvent>,
    open: AtomicBool,
    cancel: CancellationToken,
}

impl Inner {
    fn mark_closed(&self, reason: String) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::info!(reason = %reason, "Bridge channel closed");
            let _ = self.events.send(ChannelEvent::Disconnected { reason });
        }
        self.cancel.cancel();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// WebSocket connection to the bridge.
#[derive(Clone)]
pub struct WsChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsChannel")
            .field("open", &self.inner.open.load(Ordering::SeqCst))
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

impl WsChannel {
    /// Connect to the bridge at `url` (e.g. `ws://localhost:8001`).
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::info!(url = %url, "Connected to bridge");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket.
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, source) = stream.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let inner = Arc::new(Inner {
            outbound,
            listeners: ListenerTable::new(),
            events,
            open: AtomicBool::new(true),
            cancel: cancel.clone(),
        });

        tokio::spawn(write_loop(sink, rx, Arc::downgrade(&inner), cancel.clone()));
        tokio::spawn(read_loop(source, Arc::downgrade(&inner), cancel));
        let _ = inner.events.send(ChannelEvent::Connected);

        Self { inner }
    }

    /// Close the socket. Outstanding listeners receive nothing further.
    pub fn close(&self) {
        self.inner.mark_closed("closed locally".to_string());
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::UnboundedReceiver<String>,
    inner: Weak<Inner>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => {
                let Some(text) = next else { break };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    if let Some(inner) = inner.upgrade() {
                        inner.mark_closed(format!("write failed: {}", e));
                    }
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    inner: Weak<Inner>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let reason = loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = source.next() => message,
        };
        let Some(inner) = inner.upgrade() else { return };
        match message {
            Some(Ok(Message::Text(text))) => match Envelope::decode_reply(text.as_str()) {
                Ok(frame) => {
                    inner.listeners.dispatch(&frame);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable frame"),
            },
            Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("read failed: {}", e),
        }
    };
    if let Some(inner) = inner.upgrade() {
        inner.mark_closed(reason);
    }
}

impl Channel for WsChannel {
    fn send(&self, frame: Envelope) -> Result<(), ChannelError> {
        if !self.inner.open.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        tracing::trace!(command = %frame.command, endpoint = %frame.endpoint, "Queue frame");
        self.inner
            .outbound
            .send(frame.encode_request())
            .map_err(|_| ChannelError::Closed)
    }

    fn listen(&self, endpoint: &str, command: &str, listener: Listener) {
        self.inner.listeners.add(endpoint, command, listener);
    }

    fn listener_count(&self, endpoint: &str, command: &str) -> usize {
        self.inner.listeners.count(endpoint, command)
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }
}
