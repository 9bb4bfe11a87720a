//! Request/reply correlation over the shared channel
//!
//! The channel has no notion of a call. The correlator stamps every
//! outbound request with a fresh `CallId`, parks a oneshot resolver under
//! that id, and settles it when the dispatch registry sees a reply with the
//! same id. Each id is settled at most once; replies for ids that are not
//! pending are ignored.

use crate::error::{ClientError, Result};
use crate::node::RemoteNode;
use ijt_model::{CallId, Command, Envelope};
use ijt_net_types::Channel;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// What a settled call yields: the reply frame and the entity the
/// interpreters built from it, if any.
#[derive(Clone, Debug)]
pub struct Reply {
    pub message: Envelope,
    pub node: Option<Arc<RemoteNode>>,
}

type Resolver = oneshot::Sender<Result<Reply>>;

struct PendingTable {
    next: CallId,
    last_issued: Option<CallId>,
    pending: HashMap<CallId, Resolver>,
}

pub struct Correlator {
    endpoint: String,
    channel: Arc<dyn Channel>,
    timeout: Option<Duration>,
    table: Mutex<PendingTable>,
}

/// Removes the pending entry if the caller stops waiting.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.correlator.take(self.id).is_some() {
            tracing::trace!(call_id = %self.id, "Caller stopped waiting");
        }
    }
}

impl Correlator {
    pub fn new(endpoint: impl Into<String>, channel: Arc<dyn Channel>, timeout: Option<Duration>) -> Self {
        Self {
            endpoint: endpoint.into(),
            channel,
            timeout,
            table: Mutex::new(PendingTable {
                next: CallId::FIRST,
                last_issued: None,
                pending: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: CallId) -> Option<Resolver> {
        self.lock().pending.remove(&id)
    }

    /// Allocate an id and park a resolver under it.
    fn register(&self) -> (CallId, oneshot::Receiver<Result<Reply>>) {
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();
        let id = table.next;
        table.next = id.next();
        table.last_issued = Some(id);
        table.pending.insert(id, tx);
        (id, rx)
    }

    /// Send `command` with `payload` and wait for the correlated reply.
    pub async fn issue_call(&self, command: Command, payload: Value) -> Result<Reply> {
        let (id, rx) = self.register();
        let guard = PendingGuard { correlator: self, id };

        let frame = Envelope::new(command.as_str(), self.endpoint.as_str(), payload).with_call_id(id);
        tracing::debug!(call_id = %id, command = %command, endpoint = %self.endpoint, "Issue call");
        self.channel.send(frame)?;

        let outcome = match self.timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(call_id = %id, command = %command, "Call timed out");
                    return Err(ClientError::Timeout(id));
                }
            },
        };
        drop(guard);
        outcome.unwrap_or(Err(ClientError::Cancelled))
    }

    /// Settle a pending call successfully. Returns false if `id` is not pending.
    pub fn resolve_pending(&self, id: CallId, reply: Reply) -> bool {
        match self.take(id) {
            Some(resolver) => {
                let _ = resolver.send(Ok(reply));
                true
            }
            None => {
                tracing::trace!(call_id = %id, "Orphaned reply");
                false
            }
        }
    }

    /// Settle a pending call with an error. Returns false if `id` is not pending.
    pub fn reject_pending(&self, id: CallId, error: ClientError) -> bool {
        match self.take(id) {
            Some(resolver) => {
                let _ = resolver.send(Err(error));
                true
            }
            None => {
                tracing::trace!(call_id = %id, "Orphaned rejection");
                false
            }
        }
    }

    /// Fail every outstanding call. Returns how many were settled.
    pub fn reject_all(&self, error: ClientError) -> usize {
        let drained: Vec<Resolver> = self.lock().pending.drain().map(|(_, r)| r).collect();
        let count = drained.len();
        for resolver in drained {
            let _ = resolver.send(Err(error.clone()));
        }
        if count > 0 {
            tracing::warn!(count, error = %error, "Rejected outstanding calls");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn last_issued(&self) -> Option<CallId> {
        self.lock().last_issued
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("endpoint", &self.endpoint)
            .field("pending", &self.pending_count())
            .finish()
    }
}
