//! # giftrelay-server
//!
//! Upstream supervision and WebSocket fan-out for the gift relay.
//!
//! - [`supervisor::ConnectionSupervisor`] keeps one upstream session alive
//!   with bounded exponential backoff
//! - [`bridge`] forwards upstream events, in order, to the
//!   [`broadcast::BroadcastDispatcher`]
//! - [`registry::SubscriberRegistry`] holds connected subscribers; every
//!   broadcast works on a snapshot
//! - [`shutdown::ShutdownCoordinator`] tears everything down in bounded steps
//! - [`server::RelayServer`] exposes `/ws`, `/health`, and `/metrics` via Axum

#![deny(unsafe_code)]

pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod subscriber;
pub mod supervisor;
pub mod upstream;
pub mod websocket;

pub use broadcast::{BroadcastDispatcher, BroadcastOutcome, EncodeFn};
pub use config::ServerConfig;
pub use registry::SubscriberRegistry;
pub use server::{RelayServer, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, UpstreamStop};
pub use subscriber::{OutboundFrame, Subscriber};
pub use supervisor::{ConnectionSupervisor, SessionState, TerminationReason, UpstreamSession};
pub use upstream::{FeedSource, SimulatedSource, UpstreamSource};
