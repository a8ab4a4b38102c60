//! Event fan-out to registered subscribers.
//!
//! One broadcast serializes the event once, snapshots the registry, and sends
//! to every subscriber in the snapshot concurrently. All sends share a single
//! deadline. A subscriber whose send fails or misses the deadline is removed
//! from the registry and evicted; the others are unaffected.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use giftrelay_core::wire::encode_event;
use giftrelay_core::{EffectMapper, Event, RelayError, SendFailure, SubscriberId};
use metrics::{counter, histogram};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::{
    BROADCAST_DURATION_SECONDS, BROADCASTS_TOTAL, DELIVERIES_TOTAL, EVICTIONS_TOTAL,
    SERIALIZATION_DROPS_TOTAL,
};
use crate::registry::SubscriberRegistry;

/// Result of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers in the snapshot.
    pub recipients: usize,
    /// Subscribers that received the frame.
    pub delivered: usize,
    /// Subscribers removed because their send failed or timed out.
    pub evicted: Vec<SubscriberId>,
    /// Whether the broadcast was cut short by shutdown.
    pub cancelled: bool,
}

/// Turns an event into a wire frame.
pub type EncodeFn = fn(&Event, &EffectMapper, &str) -> Result<Arc<str>, RelayError>;

enum SendResult {
    Delivered,
    Failed(SendFailure),
    Cancelled,
}

/// Serializes events and fans them out.
pub struct BroadcastDispatcher {
    registry: Arc<SubscriberRegistry>,
    mapper: Arc<EffectMapper>,
    target: String,
    send_timeout: Duration,
    cancel: CancellationToken,
    encode: EncodeFn,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over `registry`.
    ///
    /// `target` is the monitored identity stamped on stream status messages.
    /// `send_timeout` bounds a whole broadcast, not each send.
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        mapper: Arc<EffectMapper>,
        target: impl Into<String>,
        send_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            mapper,
            target: target.into(),
            send_timeout,
            cancel,
            encode: encode_event,
        }
    }

    /// Replace the wire encoder.
    #[must_use]
    pub fn with_encoder(mut self, encode: EncodeFn) -> Self {
        self.encode = encode;
        self
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Broadcast one event.
    ///
    /// An empty registry is a no-op. A serialization failure drops the event
    /// and is returned as [`RelayError::Serialization`]; it is never retried.
    pub async fn broadcast(&self, event: &Event) -> Result<BroadcastOutcome, RelayError> {
        if self.registry.is_empty() {
            return Ok(BroadcastOutcome::default());
        }
        let frame = match (self.encode)(event, &self.mapper, &self.target) {
            Ok(frame) => frame,
            Err(err) => {
                counter!(SERIALIZATION_DROPS_TOTAL, "kind" => event.kind().as_str()).increment(1);
                warn!(event_kind = event.kind().as_str(), error = %err, "dropping event");
                return Err(err);
            }
        };
        Ok(self.broadcast_frame(frame).await)
    }

    /// Send an already-serialized frame to every subscriber in a snapshot.
    pub async fn broadcast_frame(&self, frame: Arc<str>) -> BroadcastOutcome {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return BroadcastOutcome::default();
        }

        let started = Instant::now();
        let deadline = started + self.send_timeout;
        counter!(BROADCASTS_TOTAL).increment(1);

        let sends = snapshot.iter().map(|sub| {
            let frame = Arc::clone(&frame);
            let cancel = &self.cancel;
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => SendResult::Cancelled,
                    result = timeout_at(deadline, sub.send(frame)) => match result {
                        Ok(Ok(())) => SendResult::Delivered,
                        Ok(Err(failure)) => SendResult::Failed(failure),
                        Err(_) => SendResult::Failed(SendFailure::TimedOut),
                    },
                }
            }
        });
        let results = join_all(sends).await;

        let mut outcome = BroadcastOutcome {
            recipients: snapshot.len(),
            ..BroadcastOutcome::default()
        };
        for (sub, result) in snapshot.iter().zip(results) {
            match result {
                SendResult::Delivered => outcome.delivered += 1,
                SendResult::Cancelled => outcome.cancelled = true,
                SendResult::Failed(reason) => {
                    let err = RelayError::SubscriberSend {
                        subscriber_id: sub.id().clone(),
                        reason,
                    };
                    warn!(error = %err, "evicting subscriber");
                    counter!(EVICTIONS_TOTAL, "reason" => reason_label(reason)).increment(1);
                    sub.evict();
                    outcome.evicted.push(sub.id().clone());
                }
            }
        }
        let _ = self.registry.remove_many(&outcome.evicted);

        counter!(DELIVERIES_TOTAL).increment(outcome.delivered as u64);
        histogram!(BROADCAST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(
            recipients = outcome.recipients,
            delivered = outcome.delivered,
            evicted = outcome.evicted.len(),
            cancelled = outcome.cancelled,
            "broadcast complete"
        );
        outcome
    }
}

fn reason_label(reason: SendFailure) -> &'static str {
    match reason {
        SendFailure::Closed => "closed",
        SendFailure::TimedOut => "timeout",
    }
}
