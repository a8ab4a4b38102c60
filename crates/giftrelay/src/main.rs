//! # giftrelay
//!
//! Gift relay binary: loads settings, starts the WebSocket server, supervises
//! the upstream live feed, and shuts everything down on SIGINT/SIGTERM or
//! when the upstream gives up.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use giftrelay_core::EffectMapper;
use giftrelay_core::logging::{effective_level, init_subscriber};
use giftrelay_server::metrics::install_recorder;
use giftrelay_server::{
    FeedSource, RelayServer, ServerConfig, SessionState, SimulatedSource, UpstreamSource,
};
use giftrelay_settings::{RelaySettings, UpstreamSettings, load_settings_from_path, settings_path};
use tracing::{error, info, warn};

/// Relay live-stream gifts to WebSocket subscribers as visual effects.
#[derive(Parser, Debug)]
#[command(name = "giftrelay", about = "Relay live-stream gifts to WebSocket subscribers")]
struct Cli {
    /// Upstream identity to monitor.
    #[arg(short, long)]
    target: Option<String>,

    /// Port to bind (busy ports are skipped).
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,

    /// Settings file (defaults to `~/.giftrelay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// WebSocket JSON feed to relay.
    #[arg(long)]
    feed_url: Option<String>,

    /// Generate random gifts instead of connecting to a feed.
    #[arg(long)]
    simulate: bool,
}

impl Cli {
    /// Overlay command-line values on loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref target) = self.target {
            settings.target.clone_from(target);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(ref url) = self.feed_url {
            settings.upstream.feed_url = Some(url.clone());
        }
        if self.simulate {
            settings.upstream.simulate = true;
        }
    }
}

/// Pick the upstream source the settings ask for.
fn select_upstream(upstream: &UpstreamSettings) -> Box<dyn UpstreamSource> {
    match (&upstream.feed_url, upstream.simulate) {
        (Some(url), false) => {
            info!(url = %url, "relaying feed");
            Box::new(FeedSource::new(url.clone()))
        }
        (_, true) => {
            info!("simulating upstream");
            Box::new(SimulatedSource::new())
        }
        (None, false) => {
            info!("no feed configured, simulating upstream");
            Box::new(SimulatedSource::new())
        }
    }
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            _ = sigint.recv() => Ok("SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        Ok("ctrl-c")
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let path = args.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("invalid configuration")?;

    init_subscriber(effective_level(args.debug, &settings.logging.level));
    let metrics = install_recorder().context("failed to install metrics recorder")?;

    let mapper = EffectMapper::with_overrides(settings.effects.clone());
    let server = RelayServer::new(
        ServerConfig::from_settings(&settings),
        settings.target.clone(),
        mapper,
    )
    .with_metrics(metrics);

    let handle = server.listen().await.context("failed to bind server")?;
    info!(
        "relaying @{} on ws://{}/ws",
        settings.target,
        handle.addr()
    );

    let _bridge = server.spawn_upstream(
        select_upstream(&settings.upstream),
        settings.upstream.backoff(),
    );

    let mut upstream_state = server.upstream_state();
    tokio::select! {
        signal = shutdown_signal() => {
            info!(signal = signal?, "shutting down");
        }
        _ = upstream_state.wait_for(|s| *s == SessionState::Terminated) => {
            warn!("upstream session ended, shutting down");
        }
    }

    let report = server.shutdown().shutdown().await;
    handle.join().await;

    if let Some(err) = report
        .termination()
        .cloned()
        .and_then(|reason| reason.into_error())
    {
        error!(error = %err, "relay stopped");
        return Ok(ExitCode::FAILURE);
    }
    info!("shutdown complete");
    Ok(ExitCode::SUCCESS)
}
