//! Subscriber liveness.
//!
//! The session's write task sends a WebSocket ping every interval; the read
//! task marks the subscriber alive on any inbound frame. This loop evicts
//! subscribers that stay silent for the configured timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::subscriber::Subscriber;

/// Outcome of the heartbeat loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The subscriber stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Number of consecutive silent intervals tolerated before timing out.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch `subscriber` until it goes silent or `cancel` fires.
///
/// At each tick the alive flag is checked and cleared. Once `timeout /
/// interval` ticks in a row find it unset, returns [`HeartbeatResult::TimedOut`],
/// so a subscriber silent from the start is evicted after `timeout`.
pub async fn run_heartbeat(
    subscriber: Arc<Subscriber>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // first tick fires immediately
    let _ = ticker.tick().await;
    // the mark set at registration is not activity
    let _ = subscriber.check_alive();
    let limit = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if subscriber.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= limit {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giftrelay_core::SubscriberId;

    fn make_subscriber() -> Arc<Subscriber> {
        let (sub, _rx) = Subscriber::channel(SubscriberId::from_string("hb".into()), 4);
        sub
    }

    #[test]
    fn max_missed_from_timeout_and_interval() {
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(90)), 3);
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(10)), 1);
        assert_eq!(max_missed(Duration::from_millis(100), Duration::from_millis(350)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_subscriber_times_out_after_timeout() {
        let sub = make_subscriber();
        let cancel = CancellationToken::new();
        let start = time::Instant::now();

        let result = run_heartbeat(
            sub,
            Duration::from_secs(30),
            Duration::from_secs(90),
            cancel,
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_after_activity_times_out_one_timeout_later() {
        let sub = make_subscriber();
        let cancel = CancellationToken::new();
        let start = time::Instant::now();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&sub),
            Duration::from_secs(30),
            Duration::from_secs(90),
            cancel,
        ));

        time::sleep(Duration::from_secs(45)).await;
        sub.mark_alive();

        assert_eq!(handle.await.unwrap(), HeartbeatResult::TimedOut);
        // checked alive at 60, then silent at 90, 120, 150
        assert_eq!(start.elapsed(), Duration::from_secs(150));
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_subscriber_stays() {
        let sub = make_subscriber();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&sub),
            Duration::from_secs(1),
            Duration::from_secs(2),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_millis(500)).await;
            sub.mark_alive();
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn cancel_before_first_check() {
        let sub = make_subscriber();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(
            sub,
            Duration::from_secs(60),
            Duration::from_secs(180),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }
}
