//! Subscriber-facing server settings.

use serde::{Deserialize, Serialize};

/// WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Preferred listen port.
    pub port: u16,
    /// How many following ports to try when `port` is busy.
    pub port_search_limit: u16,
    /// Maximum concurrent subscribers.
    pub max_connections: usize,
    /// Largest accepted inbound subscriber message, in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per subscriber.
    pub send_queue_capacity: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Silence after which a subscriber is evicted, in seconds.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            port_search_limit: 35,
            max_connections: 50,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}
