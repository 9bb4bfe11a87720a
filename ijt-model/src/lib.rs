//! IJT Model
//!
//! Pure data types for the IJT bridge client, decoupled from the channel
//! that carries them and from the cache that consumes them.
//!
//! This crate provides:
//! - `NodeId`, `QualifiedName`, `RelativePath`: addressing in the remote address space
//! - `ReferenceType`, `NodeClass`: the closed code tables of the wire contract
//! - `Envelope`, `Command`, `InboundKind`: frames exchanged with the bridge
//! - `RawNode`, `RawRelation`: browse/read payloads as the bridge encodes them

pub mod node_id;
pub mod types;
pub mod reference_type;
pub mod node_class;
pub mod wire;
pub mod raw;
pub mod namespaces;
mod lenient;

pub use node_id::{Identifier, NodeId, ParseNodeIdError};
pub use types::{CallId, LocalizedText, QualifiedName, RelativePath};
pub use reference_type::{ReferenceType, UnmappedReference};
pub use node_class::NodeClass;
pub use wire::{Command, Envelope, InboundKind};
pub use raw::{RawAttributes, RawNode, RawRelation};
pub use namespaces::NamespaceTable;
