//! IJT Net WS
//!
//! `WsChannel`: the production `Channel`, carrying JSON text frames to and
//! from the bridge over one WebSocket connection.

mod channel;

pub use channel::WsChannel;
