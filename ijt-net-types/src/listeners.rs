//! Routing table shared by channel implementations

use crate::channel::Listener;
use ijt_model::Envelope;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Inbound listeners keyed by `(endpoint, command)`.
///
/// Frames are delivered to exact matches only; a frame tagged for another
/// endpoint never reaches this endpoint's listeners.
#[derive(Default)]
pub struct ListenerTable {
    routes: RwLock<HashMap<(String, String), Vec<Listener>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(String, String), Vec<Listener>>> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, endpoint: &str, command: &str, listener: Listener) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((endpoint.to_string(), command.to_string()))
            .or_default()
            .push(listener);
    }

    pub fn count(&self, endpoint: &str, command: &str) -> usize {
        self.read()
            .get(&(endpoint.to_string(), command.to_string()))
            .map_or(0, Vec::len)
    }

    /// Deliver a frame; returns how many listeners saw it.
    pub fn dispatch(&self, frame: &Envelope) -> usize {
        // Clone out so listeners may register further routes.
        let targets: Vec<Listener> = self
            .read()
            .get(&(frame.endpoint.clone(), frame.command.clone()))
            .cloned()
            .unwrap_or_default();
        if targets.is_empty() {
            tracing::debug!(endpoint = %frame.endpoint, command = %frame.command, "No listener for frame");
        }
        for listener in &targets {
            listener(frame);
        }
        targets.len()
    }
}

impl std::fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.read().len();
        f.debug_struct("ListenerTable").field("routes", &routes).finish()
    }
}
