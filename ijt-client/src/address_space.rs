//! AddressSpace: the lazily materialized node cache
//!
//! Nodes are fetched on first use and cached by identity for the lifetime
//! of the address space (or until `reset`). Browse and read replies are
//! turned into nodes by interpreters registered on the session, so a reply
//! updates the cache even if the caller that asked for it has gone away.
//!
//! Concurrent `find_or_load` calls for the same identity share one browse.
//! The browse runs on its own task and its outcome goes to every caller
//! still waiting, so a caller that gives up never fails the others.
//!
//! Read replies carry no relations. A node first seen through a read is
//! cached as `Discovered` and is browsed on its first `find_or_load`.

use crate::dispatch::interpreter;
use crate::error::{ClientError, Result};
use crate::node::{LoadPhase, Relation, RemoteNode};
use crate::session::Session;
use futures_util::future::try_join_all;
use ijt_model::{InboundKind, NamespaceTable, NodeId, RawNode, RelativePath};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, oneshot};

type Waiter = oneshot::Sender<Result<Arc<RemoteNode>>>;

pub struct AddressSpace {
    me: Weak<AddressSpace>,
    session: Arc<Session>,
    cache: Mutex<HashMap<NodeId, Arc<RemoteNode>>>,
    in_flight: Mutex<HashMap<NodeId, Vec<Waiter>>>,
    new_nodes: broadcast::Sender<NodeId>,
    // Held across the discovery awaits so concurrent callers share one discovery.
    system: tokio::sync::Mutex<Option<Arc<RemoteNode>>>,
}

/// Owned by the load task; releases waiters however the load ends.
struct LoadGuard {
    space: Arc<AddressSpace>,
    id: NodeId,
    finished: bool,
}

impl LoadGuard {
    fn finish(mut self, outcome: &Result<Arc<RemoteNode>>) {
        self.finished = true;
        for waiter in self.space.take_waiters(&self.id) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let waiters = self.space.take_waiters(&self.id);
        tracing::debug!(node = %self.id, waiters = waiters.len(), "Load abandoned");
        for waiter in waiters {
            let _ = waiter.send(Err(ClientError::Cancelled));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AddressSpace {
    pub fn new(session: Arc<Session>) -> Arc<Self> {
        let (new_nodes, _) = broadcast::channel(session.config().event_capacity.max(1));
        let space = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            session,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            new_nodes,
            system: tokio::sync::Mutex::new(None),
        });

        let registry = space.session.registry().clone();
        let me = space.me.clone();
        registry.register(
            InboundKind::BrowseResult,
            interpreter(move |frame| match me.upgrade() {
                Some(space) if frame.exception().is_none() => {
                    space.ingest(&RawNode::from_payload(&frame.data)?, false).map(Some)
                }
                _ => Ok(None),
            }),
        );
        let me = space.me.clone();
        registry.register(
            InboundKind::ReadResult,
            interpreter(move |frame| {
                let Some(space) = me.upgrade() else { return Ok(None) };
                if frame.exception().is_some() {
                    return Ok(None);
                }
                // The caller of a raw read gets the frame either way; only
                // identifiable payloads update the cache.
                let raw = match RawNode::from_payload(&frame.data) {
                    Ok(raw) if raw.identity().is_some() => raw,
                    Ok(_) => return Ok(None),
                    Err(error) => {
                        tracing::debug!(error = %error, "Read reply not cacheable");
                        return Ok(None);
                    }
                };
                space.ingest(&raw, true).map(Some)
            }),
        );
        space
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Build or merge the entity carried by a browse or read reply.
    fn ingest(&self, raw: &RawNode, read: bool) -> Result<Arc<RemoteNode>> {
        let mut cache = lock(&self.cache);
        let id = raw.identity().cloned();
        let node = match id.as_ref().and_then(|id| cache.get(id)) {
            Some(existing) => {
                existing.merge_raw(raw)?;
                existing.clone()
            }
            None => {
                let node = Arc::new(RemoteNode::from_raw(raw)?);
                cache.insert(node.id().clone(), node.clone());
                tracing::debug!(node = %node.id(), class = %node.class(), "Cached");
                let _ = self.new_nodes.send(node.id().clone());
                node
            }
        };
        drop(cache);
        if read {
            node.apply_value(raw.current_value().cloned());
        }
        Ok(node)
    }

    fn take_waiters(&self, id: &NodeId) -> Vec<Waiter> {
        lock(&self.in_flight).remove(id).unwrap_or_default()
    }

    // ==================== Cache ====================

    /// The cached node, in whatever phase it is.
    pub fn get(&self, id: &NodeId) -> Option<Arc<RemoteNode>> {
        lock(&self.cache).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.cache).is_empty()
    }

    /// Record the target of `relation` without browsing it.
    pub fn discover(&self, relation: &Relation) -> Arc<RemoteNode> {
        let mut cache = lock(&self.cache);
        if let Some(existing) = cache.get(&relation.target) {
            return existing.clone();
        }
        let node = Arc::new(RemoteNode::discovered(relation));
        cache.insert(relation.target.clone(), node.clone());
        let _ = self.new_nodes.send(relation.target.clone());
        node
    }

    /// Identities of nodes as they enter the cache.
    pub fn subscribe_new_nodes(&self) -> broadcast::Receiver<NodeId> {
        self.new_nodes.subscribe()
    }

    /// Drop every cached node and the discovered joining system.
    pub async fn reset(&self) {
        let mut system = self.system.lock().await;
        *system = None;
        let dropped = {
            let mut cache = lock(&self.cache);
            let n = cache.len();
            cache.clear();
            n
        };
        tracing::info!(dropped, "Address space reset");
    }

    // ==================== Loading ====================

    /// The browsed node for `id`, browsing it if needed.
    pub async fn find_or_load(&self, id: &NodeId) -> Result<Arc<RemoteNode>> {
        let (rx, first) = {
            let cache = lock(&self.cache);
            if let Some(node) = cache.get(id).filter(|n| n.phase() >= LoadPhase::Browsed) {
                return Ok(node.clone());
            }
            let (tx, rx) = oneshot::channel();
            let mut in_flight = lock(&self.in_flight);
            let waiters = in_flight.entry(id.clone()).or_default();
            let first = waiters.is_empty();
            waiters.push(tx);
            (rx, first)
        };
        if first {
            self.spawn_load(id.clone());
        }
        rx.await.unwrap_or(Err(ClientError::Cancelled))
    }

    fn spawn_load(&self, id: NodeId) {
        let Some(space) = self.me.upgrade() else {
            for waiter in self.take_waiters(&id) {
                let _ = waiter.send(Err(ClientError::Cancelled));
            }
            return;
        };
        tokio::spawn(async move {
            let guard = LoadGuard { space, id, finished: false };
            let outcome = guard.space.browse(&guard.id).await;
            guard.finish(&outcome);
        });
    }

    async fn browse(&self, id: &NodeId) -> Result<Arc<RemoteNode>> {
        let reply = self.session.browse(id).await?;
        reply
            .node
            .ok_or_else(|| ClientError::Decode(format!("browse reply for {} carried no node", id)))
    }

    /// Load every relation target concurrently. One failure fails the batch.
    pub async fn resolve_relations(&self, relations: &[Relation]) -> Result<Vec<Arc<RemoteNode>>> {
        try_join_all(relations.iter().map(|r| self.find_or_load(&r.target))).await
    }

    /// Translate a browse-name path starting at `root` into an identity.
    pub async fn resolve_path(&self, root: &NodeId, path: &RelativePath) -> Result<NodeId> {
        self.session.path_to_id(root, path).await
    }

    /// Load `parent` and then its child named `browse_name`.
    pub async fn child(&self, parent: &NodeId, browse_name: &str) -> Result<Arc<RemoteNode>> {
        let relation = self.find_or_load(parent).await?.child(browse_name)?;
        self.find_or_load(&relation.target).await
    }

    /// Browse the node if needed, then read its value and mark it `Read`.
    pub async fn load_value(&self, id: &NodeId) -> Result<Arc<RemoteNode>> {
        self.find_or_load(id).await?;
        let reply = self.session.read(id, None).await?;
        reply
            .node
            .ok_or_else(|| ClientError::Decode(format!("read reply for {} carried no node", id)))
    }

    /// Raw read of a single attribute.
    pub async fn read(&self, id: &NodeId, attribute: &str) -> Result<Value> {
        let reply = self.session.read(id, Some(attribute)).await?;
        Ok(reply.message.data)
    }

    // ==================== Joining system ====================

    /// The joining system: the first object below the objects folder typed
    /// with the configured system type definition. Discovered once.
    pub async fn system(&self) -> Result<Arc<RemoteNode>> {
        let mut system = self.system.lock().await;
        if let Some(found) = system.as_ref() {
            return Ok(found.clone());
        }

        let config = self.session.config();
        self.find_or_load(&config.root).await?;
        let objects = self.find_or_load(&config.objects_folder).await?;
        let relation = objects
            .child_relations(None)
            .into_iter()
            .find(|r| {
                r.type_definition
                    .as_ref()
                    .map_or(false, |t| t.identifier_text() == config.system_type_definition)
            })
            .ok_or_else(|| ClientError::SystemNotFound(config.system_type_definition.clone()))?;

        let found = self.find_or_load(&relation.target).await?;
        tracing::info!(system = %found.id(), name = %found.display_name().text, "Joining system found");
        *system = Some(found.clone());
        Ok(found)
    }

    /// Resolve `path` (e.g. `AssetManagement/Assets/Tools`) relative to the
    /// joining system and load the node it names.
    pub async fn find_node_from_path(&self, path: &RelativePath) -> Result<Arc<RemoteNode>> {
        let system = self.system().await?;
        let id = self.resolve_path(system.id(), path).await?;
        self.find_or_load(&id).await
    }

    // ==================== Calls ====================

    pub async fn method_call(&self, object: &NodeId, method: &NodeId, arguments: Value) -> Result<Value> {
        self.session.method_call(object, method, arguments).await
    }

    pub async fn construct_extension(&self, node: &NodeId, parameters: Value) -> Result<Value> {
        self.session.construct_extension(node, parameters).await
    }

    pub async fn namespaces(&self) -> Result<NamespaceTable> {
        self.session.namespaces().await
    }

    // ==================== Links ====================

    /// Link cached node `from` to `to` under `name`.
    pub fn link(&self, from: &NodeId, name: &str, to: &NodeId) -> Result<()> {
        let node = self.get(from).ok_or_else(|| ClientError::NotCached(from.clone()))?;
        node.link(name, to.clone());
        Ok(())
    }

    /// The cached node `id` links to under `name`.
    pub fn linked(&self, id: &NodeId, name: &str) -> Option<Arc<RemoteNode>> {
        let target = self.get(id)?.linked(name)?;
        self.get(&target)
    }
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("endpoint", &self.session.endpoint())
            .field("cached", &self.len())
            .finish()
    }
}
