//! Server configuration.

use std::time::Duration;

use giftrelay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Preferred port (`0` auto-assigns).
    pub port: u16,
    /// Extra consecutive ports tried when `port` is busy.
    pub port_search_limit: u16,
    /// Maximum concurrent subscribers.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per subscriber.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Silence in seconds after which a subscriber is evicted.
    pub heartbeat_timeout_secs: u64,
    /// Aggregate deadline for one broadcast, in milliseconds.
    pub broadcast_timeout_ms: u64,
    /// Bound on closing subscribers at shutdown, in milliseconds.
    pub close_timeout_ms: u64,
    /// Bound on stopping the upstream session at shutdown, in milliseconds.
    pub upstream_stop_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            port_search_limit: 0,
            max_connections: 50,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            broadcast_timeout_ms: 5_000,
            close_timeout_ms: 3_000,
            upstream_stop_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            port_search_limit: settings.server.port_search_limit,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
            broadcast_timeout_ms: settings.broadcast.send_timeout_ms,
            close_timeout_ms: settings.shutdown.close_timeout_ms,
            upstream_stop_timeout_ms: settings.shutdown.upstream_timeout_ms,
        }
    }

    /// Heartbeat ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat eviction window.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Aggregate broadcast deadline.
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    /// Subscriber close bound.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Upstream stop bound.
    pub fn upstream_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn default_bounds() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.broadcast_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.close_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.upstream_stop_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = RelaySettings::default();
        settings.server.port = 9100;
        settings.server.max_connections = 7;
        settings.broadcast.send_timeout_ms = 250;
        settings.shutdown.close_timeout_ms = 100;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.port_search_limit, 35);
        assert_eq!(cfg.max_connections, 7);
        assert_eq!(cfg.broadcast_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.close_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.max_message_size, 65_536);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.send_queue_capacity, cfg.send_queue_capacity);
    }
}
