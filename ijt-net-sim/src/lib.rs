//! In-memory bridge simulation for the IJT client
//!
//! Provides:
//! - `SimBridge`: a `Channel` impl backed by an in-memory fixture address space
//! - `fixture`: a small tightening-system address space for tests
//!
//! Enables correlation and materialization testing without a real bridge.
//! Every frame goes through the JSON codec in both directions, so tests see
//! the same encoding a WebSocket peer would produce.

mod bridge;
pub mod fixture;

pub use bridge::{reply_frame, SimBridge};
