//! `RelayServer`: Axum HTTP + WebSocket surface and upstream wiring.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use giftrelay_core::{BackoffPolicy, EffectMapper, SubscriberId};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::bridge::spawn_event_bridge;
use crate::broadcast::BroadcastDispatcher;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::render as render_metrics;
use crate::registry::SubscriberRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::supervisor::{ConnectionSupervisor, SessionState, UpstreamSession};
use crate::upstream::UpstreamSource;
use crate::websocket::session::run_ws_session;

/// Events buffered between the supervisor and the broadcast bridge.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registered subscribers.
    pub registry: Arc<SubscriberRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Monitored upstream identity.
    pub target: Arc<str>,
    /// Live upstream session state.
    pub upstream_state: watch::Receiver<SessionState>,
    /// Server-wide shutdown token.
    pub shutdown: CancellationToken,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// A listening server.
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the HTTP server to stop.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(error = %err, "server task failed");
        }
    }
}

/// The gift relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    target: Arc<str>,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    state_tx: Arc<watch::Sender<SessionState>>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a server relaying `target`'s events with effects from `mapper`.
    pub fn new(config: ServerConfig, target: impl Into<String>, mapper: EffectMapper) -> Self {
        let target: String = target.into();
        let registry = Arc::new(SubscriberRegistry::new(config.max_connections));
        let shutdown = Arc::new(ShutdownCoordinator::new(
            Arc::clone(&registry),
            config.close_timeout(),
            config.upstream_stop_timeout(),
        ));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            Arc::clone(&registry),
            Arc::new(mapper),
            target.clone(),
            config.broadcast_timeout(),
            shutdown.token(),
        ));
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config: Arc::new(config),
            target: Arc::from(target),
            registry,
            dispatcher,
            shutdown,
            state_tx: Arc::new(state_tx),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            target: Arc::clone(&self.target),
            upstream_state: self.state_tx.subscribe(),
            shutdown: self.shutdown.token(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and start serving. Stops accepting when shutdown begins.
    ///
    /// If the configured port is busy, the next `port_search_limit` ports are
    /// tried in order.
    pub async fn listen(&self) -> io::Result<ServerHandle> {
        let listener = bind_with_search(
            &self.config.host,
            self.config.port,
            self.config.port_search_limit,
        )
        .await?;
        let addr = listener.local_addr()?;
        if self.config.port != 0 && addr.port() != self.config.port {
            info!(
                requested = self.config.port,
                port = addr.port(),
                "configured port busy, using next free port"
            );
        }
        info!(%addr, target = %self.target, "relay listening");

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(error = %err, "server error");
            }
        });
        Ok(ServerHandle { addr, task })
    }

    /// Start supervising `source` and broadcasting its events.
    ///
    /// The supervisor task is handed to the shutdown coordinator; the
    /// returned handle is the broadcast bridge.
    pub fn spawn_upstream(
        &self,
        source: Box<dyn UpstreamSource>,
        policy: BackoffPolicy,
    ) -> JoinHandle<()> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let supervisor = ConnectionSupervisor::new(policy, self.shutdown.token())
            .with_reconnect_flag(self.shutdown.reconnect_flag())
            .with_state_sender(Arc::clone(&self.state_tx));

        let bridge = spawn_event_bridge(
            event_rx,
            Arc::clone(&self.dispatcher),
            self.shutdown.token(),
        );
        let upstream = tokio::spawn(async move {
            supervisor
                .run(UpstreamSession::new(source), event_tx)
                .await
        });
        self.shutdown.attach_upstream(upstream);
        bridge
    }

    /// Observe the upstream session state.
    pub fn upstream_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Get the subscriber registry.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Get the broadcast dispatcher.
    pub fn dispatcher(&self) -> &Arc<BroadcastDispatcher> {
        &self.dispatcher
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Monitored upstream identity.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Bind `host:port`, walking up to `limit` further ports while they are busy.
pub async fn bind_with_search(host: &str, port: u16, limit: u16) -> io::Result<TcpListener> {
    let mut last_err = None;
    for offset in 0..=limit {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == io::ErrorKind::AddrInUse && port != 0 => {
                debug!(port = candidate, "port busy");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limit = state.config.max_message_size;
    let id = SubscriberId::new();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws_session(socket, id, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let upstream_state = *state.upstream_state.borrow();
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        upstream_state,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render_metrics(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), "streamer", EffectMapper::new())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.target(), "streamer");
        assert_eq!(server.registry().capacity(), 50);
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
    }

    #[test]
    fn upstream_state_starts_disconnected() {
        let server = make_server();
        assert_eq!(*server.upstream_state().borrow(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn health_endpoint_reports_state() {
        let server = make_server();
        let (status, body) = get_body(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["subscribers"], 0);
        assert_eq!(parsed["upstream_state"], "disconnected");
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let server = make_server().with_metrics(handle);
        let (status, _) = get_body(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn busy_port_moves_to_next() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_with_search("127.0.0.1", port, 5).await.unwrap();
        let got = listener.local_addr().unwrap().port();
        assert!(got > port && got <= port + 5, "got {got}, taken {port}");
    }

    #[tokio::test]
    async fn busy_port_without_search_fails() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_with_search("127.0.0.1", port, 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn listen_then_shutdown_stops_serving() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.port(), 0);

        let report = server.shutdown().shutdown().await;
        assert!(report.is_clean());
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.join())
            .await
            .unwrap();
    }
}
