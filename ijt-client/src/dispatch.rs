//! Mandatory dispatch registry
//!
//! Maps inbound message kinds to interpreter functions. Every interpreter
//! registered for a kind runs for every message of that kind, in
//! registration order, even when an earlier one fails or the frame carries
//! an exception. The last one that returns an entity decides what the
//! waiting caller receives; the call is rejected afterwards if the frame
//! reports a remote error or any interpreter failed. However many
//! interpreters a kind has, the channel only ever sees one listener for it.

use crate::correlator::{Correlator, Reply};
use crate::error::{ClientError, Result};
use crate::node::RemoteNode;
use ijt_model::{Envelope, InboundKind};
use ijt_net_types::{listener, Channel};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Turns an inbound frame into an entity (or nothing).
pub type Interpreter = Arc<dyn Fn(&Envelope) -> Result<Option<Arc<RemoteNode>>> + Send + Sync>;

/// Box a closure as an `Interpreter`.
pub fn interpreter<F>(f: F) -> Interpreter
where
    F: Fn(&Envelope) -> Result<Option<Arc<RemoteNode>>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Kinds that carry call replies; listened for from the start so every
/// reply can settle its call even when nothing interprets it.
pub const MANDATORY_KINDS: [InboundKind; 7] = [
    InboundKind::BrowseResult,
    InboundKind::ReadResult,
    InboundKind::PathToIdResult,
    InboundKind::CallResult,
    InboundKind::ConstructExtensionResult,
    InboundKind::Namespaces,
    InboundKind::ErrorMessage,
];

pub struct DispatchRegistry {
    endpoint: String,
    channel: Arc<dyn Channel>,
    correlator: Arc<Correlator>,
    interpreters: Mutex<HashMap<InboundKind, Vec<Interpreter>>>,
    listening: Mutex<HashSet<InboundKind>>,
    me: Weak<DispatchRegistry>,
}

impl DispatchRegistry {
    pub fn new(endpoint: impl Into<String>, channel: Arc<dyn Channel>, correlator: Arc<Correlator>) -> Arc<Self> {
        let registry = Arc::new_cyclic(|me| Self {
            endpoint: endpoint.into(),
            channel,
            correlator,
            interpreters: Mutex::new(HashMap::new()),
            listening: Mutex::new(HashSet::new()),
            me: me.clone(),
        });
        for kind in MANDATORY_KINDS {
            registry.ensure_listening(kind);
        }
        registry
    }

    /// Append an interpreter for `kind`.
    pub fn register(&self, kind: InboundKind, interpreter: Interpreter) {
        self.interpreters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(interpreter);
        self.ensure_listening(kind);
    }

    /// Install the channel listener for `kind` unless it already exists.
    pub fn ensure_listening(&self, kind: InboundKind) {
        let first = self
            .listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        if !first {
            return;
        }
        let me = self.me.clone();
        self.channel.listen(
            &self.endpoint,
            kind.as_str(),
            listener(move |frame| {
                if let Some(registry) = me.upgrade() {
                    registry.on_frame(kind, frame);
                }
            }),
        );
        tracing::debug!(kind = %kind, endpoint = %self.endpoint, "Listening");
    }

    pub fn interpreter_count(&self, kind: InboundKind) -> usize {
        self.interpreters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn is_listening(&self, kind: InboundKind) -> bool {
        self.listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// Handle one inbound frame of `kind`.
    pub fn on_frame(&self, kind: InboundKind, frame: &Envelope) {
        if frame.endpoint != self.endpoint {
            tracing::trace!(endpoint = %frame.endpoint, kind = %kind, "Frame for another endpoint");
            return;
        }

        let outcome = self.interpret(kind, frame);
        match (frame.call_id, outcome) {
            (Some(id), Ok(node)) => {
                self.correlator.resolve_pending(id, Reply { message: frame.clone(), node });
            }
            (Some(id), Err(error)) => {
                self.correlator.reject_pending(id, error);
            }
            (None, Err(error)) => {
                tracing::warn!(kind = %kind, error = %error, "Uncorrelated failure from bridge");
            }
            (None, Ok(_)) => {}
        }
    }

    fn interpret(&self, kind: InboundKind, frame: &Envelope) -> Result<Option<Arc<RemoteNode>>> {
        // Clone out so interpreters may register further interpreters.
        let interpreters = self
            .interpreters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut node = None;
        let mut failure = None;
        for interpreter in &interpreters {
            match interpreter(frame) {
                Ok(Some(found)) => node = Some(found),
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(kind = %kind, error = %error, "Interpreter failed");
                    failure.get_or_insert(error);
                }
            }
        }

        if let Some(exception) = frame.exception() {
            return Err(ClientError::Remote(exception.to_string()));
        }
        if kind == InboundKind::ErrorMessage {
            let text = frame
                .field("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| frame.data.to_string());
            return Err(ClientError::Remote(text));
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(node),
        }
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ijt_model::{CallId, Command, NodeClass, NodeId, QualifiedName, RawNode};
    use ijt_net_sim::{reply_frame, SimBridge};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EP: &str = "opc.tcp://unit:4840";

    fn setup() -> (SimBridge, Arc<Correlator>, Arc<DispatchRegistry>) {
        let bridge = SimBridge::new();
        let channel: Arc<dyn Channel> = Arc::new(bridge.clone());
        let correlator = Arc::new(Correlator::new(EP, channel.clone(), None));
        let registry = DispatchRegistry::new(EP, channel, correlator.clone());
        (bridge, correlator, registry)
    }

    fn node(name: &str) -> Arc<RemoteNode> {
        let raw = RawNode::new(NodeId::string(1, name), NodeClass::Object, QualifiedName::new(1, name));
        Arc::new(RemoteNode::from_raw(&raw).unwrap())
    }

    #[tokio::test]
    async fn test_mandatory_kinds_preinstalled() {
        let (bridge, _, registry) = setup();
        for kind in MANDATORY_KINDS {
            assert!(registry.is_listening(kind));
            assert_eq!(bridge.listener_count(EP, kind.as_str()), 1);
        }
        assert!(!registry.is_listening(InboundKind::SubscribedEvent));
    }

    #[tokio::test]
    async fn test_two_interpreters_one_listener() {
        let (bridge, _, registry) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let h = hits.clone();
            registry.register(InboundKind::SubscribedEvent, interpreter(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }));
        }
        assert_eq!(bridge.listener_count(EP, "event"), 1);
        assert_eq!(registry.interpreter_count(InboundKind::SubscribedEvent), 2);

        registry.on_frame(InboundKind::SubscribedEvent, &Envelope::new("event", EP, json!({})));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_entity_wins() {
        let (bridge, correlator, registry) = setup();
        bridge.ignore(Command::Browse);
        let (first, second) = (node("First"), node("Second"));
        let (a, b) = (first.clone(), second.clone());
        registry.register(InboundKind::BrowseResult, interpreter(move |_| Ok(Some(a.clone()))));
        registry.register(InboundKind::BrowseResult, interpreter(move |_| Ok(Some(b.clone()))));
        registry.register(InboundKind::BrowseResult, interpreter(|_| Ok(None)));

        let c = correlator.clone();
        let call = tokio::spawn(async move { c.issue_call(Command::Browse, json!({})).await });
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = correlator.last_issued().unwrap();
        registry.on_frame(InboundKind::BrowseResult, &reply_frame(InboundKind::BrowseResult, EP, Some(id), json!({})));

        let reply = call.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(reply.node.as_ref().unwrap(), &second));
    }

    #[tokio::test]
    async fn test_exception_rejects() {
        let (bridge, correlator, registry) = setup();
        bridge.ignore(Command::PathToId);

        let c = correlator.clone();
        let call = tokio::spawn(async move { c.issue_call(Command::PathToId, json!({})).await });
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = correlator.last_issued().unwrap();
        let frame = reply_frame(InboundKind::PathToIdResult, EP, Some(id), json!({ "exception": "PathToId Exception: BadNoMatch" }));
        registry.on_frame(InboundKind::PathToIdResult, &frame);

        assert_eq!(
            call.await.unwrap().unwrap_err(),
            ClientError::Remote("PathToId Exception: BadNoMatch".into())
        );
    }

    #[tokio::test]
    async fn test_failing_interpreter_does_not_stop_the_rest() {
        let (bridge, correlator, registry) = setup();
        bridge.ignore(Command::Browse);
        let seen = Arc::new(AtomicUsize::new(0));
        registry.register(
            InboundKind::BrowseResult,
            interpreter(|_| Err(ClientError::Decode("bad attributes".into()))),
        );
        let s = seen.clone();
        let observed = node("Observed");
        let o = observed.clone();
        registry.register(InboundKind::BrowseResult, interpreter(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(Some(o.clone()))
        }));

        let c = correlator.clone();
        let call = tokio::spawn(async move { c.issue_call(Command::Browse, json!({})).await });
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = correlator.last_issued().unwrap();
        registry.on_frame(InboundKind::BrowseResult, &reply_frame(InboundKind::BrowseResult, EP, Some(id), json!({})));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(call.await.unwrap().unwrap_err(), ClientError::Decode("bad attributes".into()));
    }

    #[tokio::test]
    async fn test_exception_frame_still_interpreted() {
        let (bridge, correlator, registry) = setup();
        bridge.ignore(Command::MethodCall);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        registry.register(InboundKind::CallResult, interpreter(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }));

        let c = correlator.clone();
        let call = tokio::spawn(async move { c.issue_call(Command::MethodCall, json!({})).await });
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = correlator.last_issued().unwrap();
        let frame = reply_frame(InboundKind::CallResult, EP, Some(id), json!({ "exception": "BadMethodInvalid" }));
        registry.on_frame(InboundKind::CallResult, &frame);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(call.await.unwrap().unwrap_err(), ClientError::Remote("BadMethodInvalid".into()));
    }

    #[tokio::test]
    async fn test_foreign_endpoint_ignored() {
        let (bridge, correlator, registry) = setup();
        bridge.ignore(Command::Read);

        let c = correlator.clone();
        let _call = tokio::spawn(async move { c.issue_call(Command::Read, json!({})).await });
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = correlator.last_issued().unwrap();
        registry.on_frame(InboundKind::ReadResult, &reply_frame(InboundKind::ReadResult, "opc.tcp://other:4840", Some(id), json!({})));
        assert_eq!(correlator.pending_count(), 1);

        // An unknown id on the right endpoint is dropped too.
        registry.on_frame(InboundKind::ReadResult, &reply_frame(InboundKind::ReadResult, EP, Some(CallId(77)), json!({})));
        assert_eq!(correlator.pending_count(), 1);
    }
}
