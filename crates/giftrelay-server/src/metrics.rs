//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Broadcasts attempted (counter).
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Frames delivered to subscribers (counter).
pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Subscribers evicted (counter, labels: reason).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Events dropped because they could not be serialized (counter, labels: kind).
pub const SERIALIZATION_DROPS_TOTAL: &str = "relay_serialization_drops_total";
/// Broadcast duration seconds (histogram).
pub const BROADCAST_DURATION_SECONDS: &str = "relay_broadcast_duration_seconds";
/// Upstream events received (counter, labels: kind).
pub const UPSTREAM_EVENTS_TOTAL: &str = "upstream_events_total";
/// Upstream reconnect attempts (counter).
pub const UPSTREAM_RECONNECTS_TOTAL: &str = "upstream_reconnects_total";
/// Upstream connected, 1 or 0 (gauge).
pub const UPSTREAM_CONNECTED: &str = "upstream_connected";
/// Subscriber connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Subscriber connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connections refused at capacity (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Registered subscribers (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Subscriber connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // No global install to avoid test conflicts.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            BROADCASTS_TOTAL,
            DELIVERIES_TOTAL,
            EVICTIONS_TOTAL,
            SERIALIZATION_DROPS_TOTAL,
            BROADCAST_DURATION_SECONDS,
            UPSTREAM_EVENTS_TOTAL,
            UPSTREAM_RECONNECTS_TOTAL,
            UPSTREAM_CONNECTED,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_REJECTED_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
