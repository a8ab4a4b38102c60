//! Reconnection policy and backoff calculation.
//!
//! The wait before retry number `attempt` (1-based) is
//! `min(base ^ attempt, cap)` seconds. The async retry loop that uses this
//! lives in the server crate's supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default backoff base.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;
/// Default backoff cap in seconds.
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 30;

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Attempts allowed before the session is given up.
    pub max_attempts: u32,
    /// Exponent base.
    pub base: u32,
    /// Upper bound on a single wait.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base: DEFAULT_BACKOFF_BASE,
            cap: Duration::from_secs(DEFAULT_BACKOFF_CAP_SECS),
        }
    }
}

impl BackoffPolicy {
    /// Build a policy.
    pub fn new(max_attempts: u32, base: u32, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Wait before retry `attempt`: `min(base ^ attempt, cap)` seconds.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = u64::from(self.base).saturating_pow(attempt);
        Duration::from_secs(secs).min(self.cap)
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
