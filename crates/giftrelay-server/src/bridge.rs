//! Forwards supervisor events to the broadcast dispatcher, one at a time.
//!
//! Events are broadcast strictly in the order they leave the supervisor. A
//! broadcast finishes (or hits its deadline) before the next one starts.

use std::sync::Arc;

use giftrelay_core::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::BroadcastDispatcher;

/// Drain `rx` into `dispatcher` until the channel closes or `cancel` fires.
#[instrument(skip_all)]
pub async fn run_event_bridge(
    mut rx: mpsc::Receiver<Event>,
    dispatcher: Arc<BroadcastDispatcher>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            debug!("event channel closed");
            break;
        };
        match dispatcher.broadcast(&event).await {
            Ok(outcome) if !outcome.evicted.is_empty() => {
                info!(
                    event_kind = event.kind().as_str(),
                    delivered = outcome.delivered,
                    evicted = outcome.evicted.len(),
                    "broadcast evicted subscribers"
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(category = ?err.category(), error = %err, "event not broadcast");
            }
        }
    }
    info!("event bridge stopped");
}

/// Spawn [`run_event_bridge`] on the runtime.
pub fn spawn_event_bridge(
    rx: mpsc::Receiver<Event>,
    dispatcher: Arc<BroadcastDispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_event_bridge(rx, dispatcher, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::EncodeFn;
    use crate::registry::SubscriberRegistry;
    use crate::subscriber::{OutboundFrame, Subscriber};
    use giftrelay_core::wire::encode_event;
    use giftrelay_core::{EffectMapper, RelayError, SubscriberId};
    use std::time::Duration;

    fn setup() -> (
        Arc<BroadcastDispatcher>,
        mpsc::Receiver<OutboundFrame>,
        CancellationToken,
    ) {
        setup_with(encode_event)
    }

    fn setup_with(
        encode: EncodeFn,
    ) -> (
        Arc<BroadcastDispatcher>,
        mpsc::Receiver<OutboundFrame>,
        CancellationToken,
    ) {
        let registry = Arc::new(SubscriberRegistry::new(10));
        let (sub, rx) = Subscriber::channel(SubscriberId::from_string("a".into()), 32);
        registry.add(sub).unwrap();
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            registry,
            Arc::new(EffectMapper::new()),
            "streamer",
            Duration::from_secs(5),
            cancel.clone(),
        )
        .with_encoder(encode));
        (dispatcher, rx, cancel)
    }

    fn event_name(frame: Option<OutboundFrame>) -> String {
        match frame {
            Some(OutboundFrame::Text(t)) => {
                let v: serde_json::Value = serde_json::from_str(&t).unwrap();
                v["event"].as_str().unwrap().to_owned()
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forwards_in_order_and_stops_when_channel_closes() {
        let (dispatcher, mut sub_rx, cancel) = setup();
        let (tx, rx) = mpsc::channel(8);
        let bridge = spawn_event_bridge(rx, dispatcher, cancel);

        tx.send(Event::connected_now()).await.unwrap();
        tx.send(Event::Comment {
            user_id: "bob".into(),
            message: "hi".into(),
            timestamp: 1,
        })
        .await
        .unwrap();
        tx.send(Event::error_now("boom")).await.unwrap();
        drop(tx);

        bridge.await.unwrap();
        assert_eq!(event_name(sub_rx.recv().await), "stream_connected");
        assert_eq!(event_name(sub_rx.recv().await), "comment");
        assert_eq!(event_name(sub_rx.recv().await), "error");
    }

    fn fail_on_errors(
        event: &Event,
        mapper: &EffectMapper,
        target: &str,
    ) -> Result<Arc<str>, RelayError> {
        if let Event::Error { .. } = event {
            return Err(RelayError::Serialization {
                event_kind: event.kind().as_str(),
                source: serde_json::from_str::<serde_json::Value>("]").unwrap_err(),
            });
        }
        encode_event(event, mapper, target)
    }

    #[tokio::test]
    async fn unserializable_event_is_skipped() {
        let (dispatcher, mut sub_rx, cancel) = setup_with(fail_on_errors);
        let (tx, rx) = mpsc::channel(8);
        let bridge = spawn_event_bridge(rx, dispatcher, cancel);

        tx.send(Event::error_now("boom")).await.unwrap();
        tx.send(Event::connected_now()).await.unwrap();
        drop(tx);

        bridge.await.unwrap();
        assert_eq!(event_name(sub_rx.recv().await), "stream_connected");
        assert!(sub_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_stops_the_bridge() {
        let (dispatcher, _sub_rx, cancel) = setup();
        let (_tx, rx) = mpsc::channel::<Event>(8);
        let bridge = spawn_event_bridge(rx, dispatcher, cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), bridge)
            .await
            .unwrap()
            .unwrap();
    }
}
