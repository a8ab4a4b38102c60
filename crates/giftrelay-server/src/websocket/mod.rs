//! Subscriber WebSocket sessions and heartbeat.

pub mod heartbeat;
pub mod session;
