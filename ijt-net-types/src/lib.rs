//! IJT Net Types
//!
//! Shared types for the bridge channel, decoupled from both the client
//! (correlation, caching) and the channel implementations (WebSocket, simulation).
//!
//! This crate provides:
//! - `Channel`: the shared duplex message channel to the bridge
//! - `ListenerTable`: routing of inbound frames by (endpoint, command)
//! - `ChannelEvent`: connectivity notifications

pub mod channel;
mod listeners;

pub use channel::{listener, Channel, ChannelError, ChannelEvent, Listener};
pub use listeners::ListenerTable;
