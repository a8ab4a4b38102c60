//! WebSocket session lifecycle: one connected subscriber from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use giftrelay_core::events::now_millis;
use giftrelay_core::wire::parse_client_message;
use giftrelay_core::{ClientMessage, SubscriberId, WireMessage};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_REJECTED_TOTAL,
};
use crate::server::AppState;
use crate::subscriber::{OutboundFrame, Subscriber};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

/// Run a WebSocket session for a connected subscriber.
///
/// 1. Registers the subscriber, or rejects it when the registry is full
/// 2. Sends `connection_established` with the upstream status
/// 3. Forwards queued broadcast frames and sends periodic pings
/// 4. Answers `ping` messages with `pong`
/// 5. Cleans up on disconnect, eviction, or heartbeat timeout
#[instrument(skip_all, fields(subscriber_id = %id))]
pub async fn run_ws_session(ws: WebSocket, id: SubscriberId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (subscriber, outbound_rx) =
        Subscriber::channel(id.clone(), state.config.send_queue_capacity);

    if let Err(err) = state.registry.add(Arc::clone(&subscriber)) {
        warn!(error = %err, "rejecting subscriber");
        counter!(WS_REJECTED_TOTAL).increment(1);
        reject(&mut ws_tx, &err.to_string()).await;
        return;
    }
    if state.shutdown.is_cancelled() {
        let _ = state.registry.remove(&id);
        reject(&mut ws_tx, "relay shutting down").await;
        return;
    }

    let started = Instant::now();
    info!("subscriber connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let status = state.upstream_state.borrow().as_str();
    match WireMessage::connection_established(&state.target, status, &id).to_json() {
        Ok(json) => {
            let _ = ws_tx.send(Message::Text(json.into())).await;
        }
        Err(err) => warn!(error = %err, "failed to encode greeting"),
    }

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        outbound_rx,
        Arc::clone(&subscriber),
        state.config.heartbeat_interval(),
    ));

    let heartbeat = {
        let subscriber = Arc::clone(&subscriber);
        let interval = state.config.heartbeat_interval();
        let timeout = state.config.heartbeat_timeout();
        tokio::spawn(async move {
            let token = subscriber.eviction_token();
            if run_heartbeat(Arc::clone(&subscriber), interval, timeout, token).await
                == HeartbeatResult::TimedOut
            {
                warn!(
                    silent_secs = subscriber.last_seen_elapsed().as_secs(),
                    "subscriber unresponsive, evicting"
                );
                subscriber.evict();
            }
        })
    };

    let evicted = subscriber.eviction_token();
    loop {
        let msg = tokio::select! {
            biased;
            () = evicted.cancelled() => {
                debug!("subscriber evicted");
                break;
            }
            msg = ws_rx.next() => msg,
        };
        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                // includes frames over the configured size limit
                info!(error = %err, "subscriber read failed");
                break;
            }
            None => break,
        };
        subscriber.mark_alive();
        match msg {
            Message::Text(text) => handle_text(&subscriber, text.as_str()),
            Message::Binary(data) => debug!(len = data.len(), "ignoring binary frame"),
            Message::Close(_) => {
                info!("subscriber sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Clean up
    let _ = state.registry.remove(&id);
    subscriber.evict();
    heartbeat.abort();
    if time::timeout(state.config.close_timeout(), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    info!(age_secs = subscriber.age().as_secs(), "subscriber disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Forward queued frames to the socket and ping on every heartbeat interval.
///
/// Exits on a close request, eviction, or write failure. Dropping the queue
/// on exit is what lets [`Subscriber::close`] resolve.
async fn write_loop(
    mut ws_tx: WsSink,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    subscriber: Arc<Subscriber>,
    ping_every: std::time::Duration,
) {
    let evicted = subscriber.eviction_token();
    let mut ping = time::interval(ping_every);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = outbound_rx.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Close) | None => {
                    let _ = ws_tx.send(close_message(close_code::AWAY, "relay shutting down")).await;
                    break;
                }
            },
            () = evicted.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}

/// Act on one inbound text frame.
fn handle_text(subscriber: &Subscriber, text: &str) {
    match parse_client_message(text) {
        Some(ClientMessage::Ping) => match WireMessage::pong(now_millis()).to_json() {
            Ok(json) => {
                if !subscriber.try_send(Arc::from(json)) {
                    debug!("pong dropped, queue full");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode pong"),
        },
        Some(ClientMessage::Other) => debug!("ignoring subscriber message"),
        None => debug!(len = text.len(), "ignoring non-JSON subscriber message"),
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_owned().into(),
    }))
}

async fn reject(ws_tx: &mut WsSink, reason: &str) {
    if let Ok(json) = WireMessage::error(reason).to_json() {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }
    let _ = ws_tx.send(close_message(close_code::AGAIN, reason)).await;
    let _ = ws_tx.close().await;
}
