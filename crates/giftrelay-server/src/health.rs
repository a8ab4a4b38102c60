//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::supervisor::SessionState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Current upstream session state.
    pub upstream_state: SessionState,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    subscribers: usize,
    upstream_state: SessionState,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
        upstream_state,
    }
}
