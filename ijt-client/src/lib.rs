//! IJT Client
//!
//! Client side of the IJT bridge: many concurrent logical calls multiplexed
//! over one message channel, and a lazily materialized cache of the remote
//! address space built from their replies.
//!
//! This crate provides:
//! - `Correlator`: pairs outbound calls with inbound replies by `CallId`
//! - `DispatchRegistry`: fans each inbound message kind out to its interpreters
//! - `RemoteNode`, `Relation`: the cached graph entities
//! - `AddressSpace`: find-or-load with coalesced concurrent loads
//! - `Session`: the explicit per-endpoint context (connection state, events)
//! - `Client`, `ClientBuilder`, `ClientConfig`: wiring and configuration

pub mod address_space;
pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod session;

pub use address_space::AddressSpace;
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use correlator::{Correlator, Reply};
pub use dispatch::{interpreter, DispatchRegistry, Interpreter, MANDATORY_KINDS};
pub use error::{ClientError, GraphError, Result};
pub use node::{LoadPhase, NodeSnapshot, NodeVariant, Relation, RemoteNode};
pub use session::{ConnectionStatus, Session};
