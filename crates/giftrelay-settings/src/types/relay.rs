//! Upstream, broadcast, shutdown, and logging settings.

use std::time::Duration;

use giftrelay_core::retry::{
    BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP_SECS, DEFAULT_MAX_ATTEMPTS,
};
use serde::{Deserialize, Serialize};

/// Upstream session settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Backoff exponent base.
    pub backoff_base: u32,
    /// Backoff cap in seconds.
    pub backoff_cap_secs: u64,
    /// WebSocket JSON feed of upstream events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    /// Use the built-in simulated source.
    pub simulate: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap_secs: DEFAULT_BACKOFF_CAP_SECS,
            feed_url: None,
            simulate: false,
        }
    }
}

impl UpstreamSettings {
    /// The reconnect policy these settings describe.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_attempts,
            self.backoff_base,
            Duration::from_secs(self.backoff_cap_secs),
        )
    }
}

/// Fan-out settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    /// Deadline for one broadcast across all subscribers, in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
        }
    }
}

/// Teardown bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownSettings {
    /// Bound on closing all subscriber transports, in milliseconds.
    pub close_timeout_ms: u64,
    /// Bound on stopping the upstream session, in milliseconds.
    pub upstream_timeout_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            close_timeout_ms: 3_000,
            upstream_timeout_ms: 5_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
