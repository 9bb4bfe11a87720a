//! SimBridge: in-memory Channel implementation
//!
//! Requests are answered from a fixture address space. Replies are queued
//! and delivered in order by a background task, so a reply never reaches a
//! listener before `send` has returned.

use ijt_model::namespaces;
use ijt_model::{CallId, Command, Envelope, InboundKind, NodeId, RawNode, RelativePath};
use ijt_net_types::{Channel, ChannelError, ChannelEvent, Listener, ListenerTable};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, mpsc};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Fixture {
    nodes: HashMap<NodeId, RawNode>,
    paths: HashMap<(NodeId, String), NodeId>,
    methods: HashMap<(NodeId, NodeId), Value>,
    failures: HashMap<(String, NodeId), String>,
    namespaces: Vec<String>,
    silent: HashSet<String>,
}

struct BridgeState {
    fixture: Mutex<Fixture>,
    sent: Mutex<Vec<Envelope>>,
    // Some while replies are being held back.
    held: Mutex<Option<Vec<Envelope>>>,
    listeners: ListenerTable,
    events: broadcast::Sender<ChannelEvent>,
    outbox: mpsc::UnboundedSender<String>,
    open: AtomicBool,
}

/// In-memory bridge and the channel leading to it.
///
/// Cloning yields another handle to the same bridge. Must be created inside
/// a tokio runtime.
#[derive(Clone)]
pub struct SimBridge {
    state: Arc<BridgeState>,
}

impl std::fmt::Debug for SimBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBridge")
            .field("open", &self.state.open.load(Ordering::SeqCst))
            .field("listeners", &self.state.listeners)
            .finish()
    }
}

impl SimBridge {
    pub fn new() -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(BridgeState {
            fixture: Mutex::new(Fixture {
                namespaces: vec![namespaces::OPC_UA.to_string()],
                ..Default::default()
            }),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(None),
            listeners: ListenerTable::new(),
            events,
            outbox,
            open: AtomicBool::new(true),
        });
        tokio::spawn(deliver(Arc::downgrade(&state), rx));
        Self { state }
    }

    // ==================== Fixture ====================

    pub fn add_node(&self, node: RawNode) -> &Self {
        if let Some(id) = node.identity().cloned() {
            lock(&self.state.fixture).nodes.insert(id, node);
        }
        self
    }

    /// Answer `pathtoid` from `start` along `path` with `target`.
    pub fn add_path(&self, start: NodeId, path: &RelativePath, target: NodeId) -> &Self {
        lock(&self.state.fixture).paths.insert((start, path.to_wire()), target);
        self
    }

    pub fn add_method_output(&self, object: NodeId, method: NodeId, output: Value) -> &Self {
        lock(&self.state.fixture).methods.insert((object, method), output);
        self
    }

    /// Make `command` on `node` fail with `exception`.
    pub fn fail(&self, command: Command, node: NodeId, exception: impl Into<String>) -> &Self {
        lock(&self.state.fixture)
            .failures
            .insert((command.as_str().to_string(), node), exception.into());
        self
    }

    /// Never answer `command`.
    pub fn ignore(&self, command: Command) -> &Self {
        lock(&self.state.fixture).silent.insert(command.as_str().to_string());
        self
    }

    pub fn set_namespaces(&self, uris: Vec<String>) -> &Self {
        lock(&self.state.fixture).namespaces = uris;
        self
    }

    // ==================== Test hooks ====================

    /// Queue replies instead of delivering them until `release_replies`.
    pub fn hold_replies(&self) {
        lock(&self.state.held).get_or_insert_with(Vec::new);
    }

    /// Deliver every held reply in order and stop holding. Returns how many were released.
    pub fn release_replies(&self) -> usize {
        let frames = lock(&self.state.held).take().unwrap_or_default();
        let count = frames.len();
        for frame in frames {
            self.push(frame);
        }
        count
    }

    /// Deliver an arbitrary inbound frame, e.g. a reply for another endpoint.
    pub fn inject(&self, frame: Envelope) {
        self.push(frame);
    }

    /// Every request received so far, decoded from the wire.
    pub fn sent_frames(&self) -> Vec<Envelope> {
        lock(&self.state.sent).clone()
    }

    pub fn count_sent(&self, command: Command) -> usize {
        lock(&self.state.sent)
            .iter()
            .filter(|f| f.command == command.as_str())
            .count()
    }

    /// Simulate the channel dropping.
    pub fn disconnect(&self, reason: &str) {
        if self.state.open.swap(false, Ordering::SeqCst) {
            let _ = self.state.events.send(ChannelEvent::Disconnected { reason: reason.to_string() });
        }
    }

    fn push(&self, frame: Envelope) {
        let _ = self.state.outbox.send(frame.encode_reply());
    }

    fn reply(&self, frame: Envelope) {
        if let Some(queue) = lock(&self.state.held).as_mut() {
            queue.push(frame);
            return;
        }
        self.push(frame);
    }

    // ==================== Request handling ====================

    fn answer(&self, request: &Envelope) -> Vec<Envelope> {
        let fixture = lock(&self.state.fixture);
        if fixture.silent.contains(&request.command) {
            return Vec::new();
        }
        let endpoint = request.endpoint.as_str();
        let Ok(command) = request.command.parse::<Command>() else {
            tracing::warn!(command = %request.command, "Bridge received unknown command");
            let data = json!({ "exception": format!("Unknown command {}", request.command) });
            return vec![reply_frame(InboundKind::ErrorMessage, endpoint, request.call_id, data)];
        };
        let reply = |data: Value| reply_frame(command.reply_kind(), endpoint, request.call_id, data);

        let subject = request.field("nodeid").and_then(parse_id);
        if let Some(exception) = subject
            .as_ref()
            .and_then(|id| fixture.failures.get(&(request.command.clone(), id.clone())))
        {
            return vec![reply(json!({ "exception": exception }))];
        }

        match command {
            Command::Browse | Command::Read => {
                let node = subject.as_ref().and_then(|id| fixture.nodes.get(id));
                let attribute = request.field("attribute").and_then(Value::as_str);
                match (node, command) {
                    (Some(node), Command::Browse) => vec![reply(encode_browse(node))],
                    (Some(node), _) => vec![reply(encode_read(node, attribute))],
                    (None, _) => vec![reply(json!({
                        "exception": format!("{} Exception: unknown node {}", command, describe(&subject))
                    }))],
                }
            }
            Command::PathToId => {
                let path = request.field("path").and_then(Value::as_str).unwrap_or_default();
                let target = subject
                    .clone()
                    .and_then(|start| fixture.paths.get(&(start, path.to_string())));
                match target {
                    Some(target) => vec![reply(json!({ "nodeid": target.to_string() }))],
                    None => vec![reply(json!({
                        "exception": format!("PathToId Exception: no target for {}", path)
                    }))],
                }
            }
            Command::MethodCall => {
                let object = request.field("objectnode").and_then(parse_id);
                let method = request.field("methodnode").and_then(parse_id);
                let output = object.zip(method).and_then(|key| fixture.methods.get(&key));
                match output {
                    Some(output) => vec![reply(json!({ "output": output }))],
                    None => vec![reply(json!({ "exception": "Method call exception: BadMethodInvalid" }))],
                }
            }
            Command::ConstructExtension => vec![reply(json!({
                "output": {
                    "TypeId": describe(&subject),
                    "Body": request.field("parameters").cloned().unwrap_or(Value::Null),
                }
            }))],
            Command::Namespaces => {
                let list = serde_json::to_string(&fixture.namespaces).unwrap_or_default();
                vec![reply(json!({ "namespaces": list }))]
            }
            Command::Subscribe => vec![reply(json!({}))],
            Command::ConnectTo => vec![
                reply(json!({})),
                reply_frame(InboundKind::SessionEstablished, endpoint, None, json!({})),
            ],
            Command::TerminateConnection => vec![reply(json!({}))],
        }
    }
}

impl Default for SimBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_id(value: &Value) -> Option<NodeId> {
    serde_json::from_value(value.clone()).ok()
}

fn describe(id: &Option<NodeId>) -> String {
    id.as_ref().map(NodeId::to_string).unwrap_or_else(|| "<none>".to_string())
}

// Same shape the bridge produces: nested documents as JSON strings.
fn encode_browse(node: &RawNode) -> Value {
    let attributes = serde_json::to_string(&node.attributes).unwrap_or_default();
    let relations = serde_json::to_string(node.relations()).unwrap_or_default();
    json!({
        "nodeid": node.identity().map(NodeId::to_string),
        "attributes": attributes,
        "relations": relations,
    })
}

// A read never lists references. Reading every attribute (`attribute`
// absent) also returns the attribute block.
fn encode_read(node: &RawNode, attribute: Option<&str>) -> Value {
    let mut data = json!({
        "nodeid": node.identity().map(NodeId::to_string),
        "attribute": attribute,
    });
    if attribute.is_none() {
        data["attributes"] = Value::String(serde_json::to_string(&node.attributes).unwrap_or_default());
    }
    if let Some(value) = node.current_value() {
        data["value"] = Value::String(value.to_string());
    }
    data
}

async fn deliver(state: Weak<BridgeState>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        let Some(state) = state.upgrade() else { break };
        if !state.open.load(Ordering::SeqCst) {
            continue;
        }
        match Envelope::decode_reply(&text) {
            Ok(frame) => {
                tracing::trace!(command = %frame.command, endpoint = %frame.endpoint, "Sim delivering");
                state.listeners.dispatch(&frame);
            }
            Err(e) => tracing::warn!(error = %e, "Sim produced undecodable frame"),
        }
    }
}

impl Channel for SimBridge {
    fn send(&self, frame: Envelope) -> Result<(), ChannelError> {
        if !self.state.open.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let request = Envelope::decode_request(&frame.encode_request())
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        lock(&self.state.sent).push(request.clone());
        for reply in self.answer(&request) {
            self.reply(reply);
        }
        Ok(())
    }

    fn listen(&self, endpoint: &str, command: &str, listener: Listener) {
        self.state.listeners.add(endpoint, command, listener);
    }

    fn listener_count(&self, endpoint: &str, command: &str) -> usize {
        self.state.listeners.count(endpoint, command)
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.state.events.subscribe()
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}

/// Build a reply frame as the bridge would send it.
pub fn reply_frame(kind: InboundKind, endpoint: &str, call_id: Option<CallId>, data: Value) -> Envelope {
    let env = Envelope::new(kind.as_str(), endpoint, data);
    match call_id {
        Some(id) => env.with_call_id(id),
        None => env,
    }
}
