//! Error types for ijt-client

use ijt_model::{CallId, NodeId, UnmappedReference};
use ijt_net_types::ChannelError;
use thiserror::Error;

/// Errors raised while turning bridge payloads into graph entities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("referenceTypeId {0} not mapped")]
    UnmappedReference(u32),

    #[error("Non-numeric reference type {0}")]
    NonNumericReference(NodeId),

    #[error("Payload carries no node identity")]
    MissingIdentity,

    #[error("Identity mismatch: merging {actual} into {expected}")]
    IdentityMismatch { expected: NodeId, actual: NodeId },
}

impl From<UnmappedReference> for GraphError {
    fn from(e: UnmappedReference) -> Self {
        GraphError::UnmappedReference(e.0)
    }
}

/// Client errors. `Clone` so one outcome can settle every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] ChannelError),

    #[error("Remote exception: {0}")]
    Remote(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Call {0} timed out")]
    Timeout(CallId),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Disconnected: {0}")]
    Disconnected(String),

    #[error("No child '{name}' under {parent}")]
    ChildNotFound { parent: NodeId, name: String },

    #[error("Node {0} is not cached")]
    NotCached(NodeId),

    #[error("No object with type definition {0} below the objects folder")]
    SystemNotFound(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
