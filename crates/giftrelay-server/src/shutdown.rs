//! Ordered, bounded teardown.
//!
//! [`ShutdownCoordinator::shutdown`] runs four steps, each bounded on its own:
//!
//! 1. disable upstream reconnects and fire the cancellation token
//! 2. close every subscriber in a registry snapshot, then clear the registry
//! 3. wait for the upstream supervisor to stop, aborting it on timeout
//! 4. report
//!
//! A step that times out is logged and the next step still runs. Later calls
//! return the first call's report without repeating any step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use giftrelay_core::RelayError;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::SubscriberRegistry;
use crate::supervisor::TerminationReason;

/// Step name used when subscriber closes exceed their bound.
pub const STEP_CLOSE_SUBSCRIBERS: &str = "close_subscribers";
/// Step name used when the upstream stop exceeds its bound.
pub const STEP_STOP_UPSTREAM: &str = "stop_upstream";

/// What happened to the upstream supervisor during shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamStop {
    /// No supervisor was attached.
    NotRunning,
    /// The supervisor returned.
    Finished(TerminationReason),
    /// The supervisor task panicked or was aborted elsewhere.
    Failed(String),
    /// The supervisor did not return in time and was aborted.
    TimedOut,
}

/// Outcome of a shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Subscribers registered when shutdown began.
    pub subscribers: usize,
    /// Subscribers whose transport closed within the bound.
    pub closed: usize,
    /// Upstream outcome.
    pub upstream: UpstreamStop,
    /// Steps that exceeded their bound.
    pub timed_out_steps: Vec<&'static str>,
    /// Total time spent.
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Whether every step finished within its bound.
    pub fn is_clean(&self) -> bool {
        self.timed_out_steps.is_empty()
    }

    /// The upstream termination, if the supervisor returned.
    pub fn termination(&self) -> Option<&TerminationReason> {
        match &self.upstream {
            UpstreamStop::Finished(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Coordinates teardown of the upstream session and all subscribers.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    should_reconnect: Arc<AtomicBool>,
    registry: Arc<SubscriberRegistry>,
    upstream: Mutex<Option<JoinHandle<TerminationReason>>>,
    close_timeout: Duration,
    upstream_timeout: Duration,
    report: OnceCell<ShutdownReport>,
}

impl ShutdownCoordinator {
    /// Create a coordinator over `registry` with the given step bounds.
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        close_timeout: Duration,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            token: CancellationToken::new(),
            should_reconnect: Arc::new(AtomicBool::new(true)),
            registry,
            upstream: Mutex::new(None),
            close_timeout,
            upstream_timeout,
            report: OnceCell::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The flag the supervisor consults before retrying.
    pub fn reconnect_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_reconnect)
    }

    /// Hand over the running supervisor task.
    pub fn attach_upstream(&self, handle: JoinHandle<TerminationReason>) {
        if let Some(previous) = self.upstream.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The report, once shutdown has completed.
    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.get()
    }

    /// Tear everything down. Idempotent.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.report.get_or_init(|| self.run_steps()).await.clone()
    }

    async fn run_steps(&self) -> ShutdownReport {
        let started = Instant::now();
        let mut timed_out_steps = Vec::new();

        // 1. no more retries; abort in-flight waits and broadcasts
        self.should_reconnect.store(false, Ordering::SeqCst);
        self.token.cancel();
        info!("shutdown started");

        // 2. close subscribers under one shared deadline
        let snapshot = self.registry.snapshot();
        let deadline = Instant::now() + self.close_timeout;
        let closes = snapshot
            .iter()
            .map(|sub| async move { timeout_at(deadline, sub.close()).await.is_ok() });
        let closed = join_all(closes).await.into_iter().filter(|ok| *ok).count();
        if closed < snapshot.len() {
            let err = RelayError::ShutdownTimeout {
                step: STEP_CLOSE_SUBSCRIBERS,
                timeout: self.close_timeout,
            };
            warn!(error = %err, pending = snapshot.len() - closed, "subscriber close incomplete");
            timed_out_steps.push(STEP_CLOSE_SUBSCRIBERS);
        }
        for sub in self.registry.clear() {
            sub.evict();
        }
        for sub in &snapshot {
            sub.evict();
        }

        // 3. stop the upstream session
        let handle = self.upstream.lock().take();
        let upstream = match handle {
            None => UpstreamStop::NotRunning,
            Some(mut handle) => match timeout(self.upstream_timeout, &mut handle).await {
                Ok(Ok(reason)) => UpstreamStop::Finished(reason),
                Ok(Err(join_err)) => {
                    warn!(error = %join_err, "upstream task failed");
                    UpstreamStop::Failed(join_err.to_string())
                }
                Err(_) => {
                    handle.abort();
                    let err = RelayError::ShutdownTimeout {
                        step: STEP_STOP_UPSTREAM,
                        timeout: self.upstream_timeout,
                    };
                    warn!(error = %err, "aborting upstream task");
                    timed_out_steps.push(STEP_STOP_UPSTREAM);
                    UpstreamStop::TimedOut
                }
            },
        };

        // 4. report
        let report = ShutdownReport {
            subscribers: snapshot.len(),
            closed,
            upstream,
            timed_out_steps,
            elapsed: started.elapsed(),
        };
        info!(
            subscribers = report.subscribers,
            closed = report.closed,
            upstream = ?report.upstream,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "shutdown complete"
        );
        report
    }
}
