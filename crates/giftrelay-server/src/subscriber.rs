//! One downstream connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use giftrelay_core::events::now_millis;
use giftrelay_core::{SendFailure, SubscriberId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A frame queued for a subscriber's write task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized wire message, shared across all recipients of a broadcast.
    Text(Arc<str>),
    /// Close the transport.
    Close,
}

/// A registered downstream subscriber.
///
/// The transport is represented by the sending half of the subscriber's
/// outbound queue. The write task owns the receiving half and drops it when
/// the transport closes.
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<OutboundFrame>,
    /// When this subscriber connected.
    pub connected_at: Instant,
    /// Connection time, epoch milliseconds.
    pub connected_at_ms: i64,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    evicted: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber around an existing queue.
    pub fn new(id: SubscriberId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            connected_at_ms: now_millis(),
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            evicted: CancellationToken::new(),
        }
    }

    /// Create a subscriber with a fresh queue of `capacity` frames.
    pub fn channel(
        id: SubscriberId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Subscriber identifier.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Queue a frame, waiting for room if the queue is full.
    ///
    /// Callers bound the wait; a closed transport fails immediately.
    pub async fn send(&self, text: Arc<str>) -> Result<(), SendFailure> {
        self.tx
            .send(OutboundFrame::Text(text))
            .await
            .map_err(|_| SendFailure::Closed)
    }

    /// Queue a frame without waiting. Returns `false` if full or closed.
    pub fn try_send(&self, text: Arc<str>) -> bool {
        self.tx.try_send(OutboundFrame::Text(text)).is_ok()
    }

    /// Ask the write task to close the transport and wait until it has.
    ///
    /// Resolves immediately if the transport is already gone. Does not
    /// resolve while a stuck write task keeps its queue open.
    pub async fn close(&self) {
        let _ = self.tx.send(OutboundFrame::Close).await;
        self.tx.closed().await;
    }

    /// Whether the write task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Signal the session tasks to stop.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Whether [`evict`](Self::evict) has been called.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Token cancelled on eviction.
    pub fn eviction_token(&self) -> CancellationToken {
        self.evicted.clone()
    }

    /// Record inbound activity (pong or any message).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if there was activity since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("connected_at_ms", &self.connected_at_ms)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
