//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it changes.

mod relay;
mod server;

pub use relay::*;
pub use server::*;

use std::collections::HashMap;
use std::time::Duration;

use giftrelay_core::EffectDescriptor;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default stream target when none is configured.
pub const DEFAULT_TARGET: &str = "your_username";

/// Root settings type for the relay.
///
/// Loaded from `~/.giftrelay/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "target": "somecreator",
///   "server": { "port": 9000 },
///   "effects": {
///     "Lion": { "type": "majestic_roar", "intensity": 9, "color": "#FFD700",
///               "particles": 3500, "sound": "lion_roar" }
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Live stream the upstream session attaches to.
    pub target: String,
    /// Subscriber-facing server.
    pub server: ServerSettings,
    /// Upstream session and reconnect policy.
    pub upstream: UpstreamSettings,
    /// Fan-out bounds.
    pub broadcast: BroadcastSettings,
    /// Teardown bounds.
    pub shutdown: ShutdownSettings,
    /// Logging.
    pub logging: LoggingSettings,
    /// Gift → effect entries added to or replacing the built-in catalog.
    pub effects: HashMap<String, EffectDescriptor>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            server: ServerSettings::default(),
            upstream: UpstreamSettings::default(),
            broadcast: BroadcastSettings::default(),
            shutdown: ShutdownSettings::default(),
            logging: LoggingSettings::default(),
            effects: HashMap::new(),
        }
    }
}

impl RelaySettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(SettingsError::invalid("target", "must not be empty"));
        }
        if self.upstream.max_attempts == 0 {
            return Err(SettingsError::invalid("upstream.maxAttempts", "must be at least 1"));
        }
        if self.upstream.backoff_base < 2 {
            return Err(SettingsError::invalid("upstream.backoffBase", "must be at least 2"));
        }
        if self.upstream.backoff_cap_secs == 0 {
            return Err(SettingsError::invalid("upstream.backoffCapSecs", "must be at least 1"));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::invalid("server.maxConnections", "must be at least 1"));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::invalid("server.sendQueueCapacity", "must be at least 1"));
        }
        if self.server.heartbeat_interval_secs == 0
            || self.server.heartbeat_timeout_secs <= self.server.heartbeat_interval_secs
        {
            return Err(SettingsError::invalid(
                "server.heartbeatTimeoutSecs",
                "must exceed a non-zero heartbeatIntervalSecs",
            ));
        }
        if self.broadcast.send_timeout_ms == 0 {
            return Err(SettingsError::invalid("broadcast.sendTimeoutMs", "must be at least 1"));
        }
        for (gift, effect) in &self.effects {
            effect
                .validate()
                .map_err(|e| SettingsError::invalid(format!("effects.{gift}"), e))?;
        }
        Ok(())
    }

    /// Aggregate deadline for one broadcast.
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast.send_timeout_ms)
    }

    /// Bound on closing all subscribers during shutdown.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.close_timeout_ms)
    }

    /// Bound on stopping the upstream session during shutdown.
    pub fn upstream_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.upstream_timeout_ms)
    }
}
