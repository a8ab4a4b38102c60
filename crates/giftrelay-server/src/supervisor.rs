//! Upstream session lifecycle.
//!
//! [`ConnectionSupervisor::run`] owns the [`UpstreamSession`]: it connects,
//! pumps callbacks into the event sink, and on each failure increments the
//! attempt counter and waits `min(base ^ attempt, cap)`. If the counter has
//! reached the budget after that wait, the session terminates with
//! [`TerminationReason::MaxAttemptsExceeded`] instead of retrying. Cancellation aborts any
//! connect, receive, or backoff wait immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use giftrelay_core::{BackoffPolicy, Event, RelayError, UpstreamError, UpstreamEvent};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::{UPSTREAM_CONNECTED, UPSTREAM_EVENTS_TOTAL, UPSTREAM_RECONNECTS_TOTAL};
use crate::upstream::UpstreamSource;

/// Upstream session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not connected and not trying.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Receiving events.
    Connected,
    /// Waiting out a backoff before the next attempt.
    Reconnecting,
    /// The supervisor has returned.
    Terminated,
}

impl SessionState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the supervisor returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// The reconnect budget was exhausted.
    MaxAttemptsExceeded {
        /// Attempt counter at termination.
        attempts: u32,
        /// The failure that ended the last attempt.
        last_error: Option<UpstreamError>,
    },
    /// The cancellation token fired.
    Cancelled,
    /// Reconnecting was disabled and the session ended.
    Stopped,
}

impl TerminationReason {
    /// The fatal error to surface to the caller, if this termination is one.
    pub fn into_error(self) -> Option<RelayError> {
        match self {
            Self::MaxAttemptsExceeded {
                attempts,
                last_error,
            } => Some(RelayError::FatalUpstream {
                attempts,
                last_error,
            }),
            Self::Cancelled | Self::Stopped => None,
        }
    }

    /// Whether this termination is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MaxAttemptsExceeded { .. })
    }
}

/// The connection to the upstream source.
///
/// Only the supervisor mutates it.
pub struct UpstreamSession {
    source: Box<dyn UpstreamSource>,
    state: SessionState,
    attempt: u32,
}

impl UpstreamSession {
    /// Wrap a source in a fresh session.
    pub fn new(source: Box<dyn UpstreamSource>) -> Self {
        Self {
            source,
            state: SessionState::Disconnected,
            attempt: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Drives an [`UpstreamSession`] until it terminates.
pub struct ConnectionSupervisor {
    policy: BackoffPolicy,
    cancel: CancellationToken,
    should_reconnect: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl ConnectionSupervisor {
    /// Create a supervisor with its own reconnect flag and state channel.
    pub fn new(policy: BackoffPolicy, cancel: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            policy,
            cancel,
            should_reconnect: Arc::new(AtomicBool::new(true)),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Share a reconnect flag with whoever may disable retries.
    #[must_use]
    pub fn with_reconnect_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.should_reconnect = flag;
        self
    }

    /// Publish state changes on an existing channel.
    #[must_use]
    pub fn with_state_sender(mut self, state_tx: Arc<watch::Sender<SessionState>>) -> Self {
        self.state_tx = state_tx;
        self
    }

    /// Observe state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The reconnect flag; store `false` to stop retrying.
    pub fn reconnect_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_reconnect)
    }

    /// Run the session to termination, delivering events to `sink`.
    #[instrument(skip_all, fields(max_attempts = self.policy.max_attempts))]
    pub async fn run(
        &self,
        mut session: UpstreamSession,
        sink: mpsc::Sender<Event>,
    ) -> TerminationReason {
        loop {
            if self.cancel.is_cancelled() {
                return self.terminate(&mut session, TerminationReason::Cancelled).await;
            }

            self.transition(&mut session, SessionState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return self.terminate(&mut session, TerminationReason::Cancelled).await;
                }
                result = session.source.connect() => result,
            };

            let last_error = match connected {
                Ok(()) => {
                    session.attempt = 0;
                    self.transition(&mut session, SessionState::Connected);
                    gauge!(UPSTREAM_CONNECTED).set(1.0);
                    info!("upstream connected");
                    self.emit(&sink, Event::connected_now()).await;

                    let Some(failure) = self.pump(&mut session, &sink).await else {
                        return self.terminate(&mut session, TerminationReason::Cancelled).await;
                    };
                    gauge!(UPSTREAM_CONNECTED).set(0.0);
                    self.transition(&mut session, SessionState::Disconnected);
                    warn!(error = %failure, "upstream session ended");
                    failure
                }
                Err(err) => {
                    self.transition(&mut session, SessionState::Disconnected);
                    self.emit(&sink, Event::error_now(err.to_string())).await;
                    err
                }
            };

            if !self.should_reconnect.load(Ordering::SeqCst) {
                info!("reconnect disabled, stopping");
                return self.terminate(&mut session, TerminationReason::Stopped).await;
            }
            session.attempt += 1;
            let wait = self.policy.delay_for(session.attempt);
            let err = RelayError::TransientUpstream {
                attempt: session.attempt,
                source: last_error.clone(),
            };
            warn!(
                error = %err,
                attempt = session.attempt,
                wait_secs = wait.as_secs(),
                "upstream attempt failed, backing off"
            );
            self.transition(&mut session, SessionState::Reconnecting);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return self.terminate(&mut session, TerminationReason::Cancelled).await;
                }
                () = tokio::time::sleep(wait) => {}
            }

            if self.policy.exhausted(session.attempt) {
                let reason = TerminationReason::MaxAttemptsExceeded {
                    attempts: session.attempt,
                    last_error: Some(last_error),
                };
                error!(attempts = session.attempt, "upstream reconnect budget exhausted");
                return self.terminate(&mut session, reason).await;
            }
            counter!(UPSTREAM_RECONNECTS_TOTAL).increment(1);
        }
    }

    /// Deliver events until the session fails. `None` means cancelled.
    async fn pump(
        &self,
        session: &mut UpstreamSession,
        sink: &mpsc::Sender<Event>,
    ) -> Option<UpstreamError> {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                next = session.source.next_event() => next,
            };
            match next {
                Ok(Some(UpstreamEvent::Connect { .. })) => {
                    debug!("upstream connect callback, already announced");
                }
                Ok(Some(upstream)) => {
                    let terminal = upstream.is_terminal();
                    let event = upstream.into_event();
                    counter!(UPSTREAM_EVENTS_TOTAL, "kind" => event.kind().as_str()).increment(1);
                    let failure = terminal.then(|| match &event {
                        Event::Error { description, .. } => {
                            UpstreamError::Protocol(description.clone())
                        }
                        Event::Disconnected { reason, .. } => UpstreamError::Closed(reason.clone()),
                        _ => UpstreamError::Closed("upstream ended".into()),
                    });
                    self.emit(sink, event).await;
                    if let Some(failure) = failure {
                        return Some(failure);
                    }
                }
                Ok(None) => {
                    let reason = "upstream closed";
                    self.emit(sink, Event::disconnected_now(reason)).await;
                    return Some(UpstreamError::Closed(reason.into()));
                }
                Err(err) => {
                    self.emit(sink, Event::error_now(err.to_string())).await;
                    return Some(err);
                }
            }
        }
    }

    async fn emit(&self, sink: &mpsc::Sender<Event>, event: Event) {
        let kind = event.kind().as_str();
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            sent = sink.send(event) => {
                if sent.is_err() {
                    debug!(event_kind = kind, "event sink closed, dropping event");
                }
            }
        }
    }

    fn transition(&self, session: &mut UpstreamSession, next: SessionState) {
        session.state = next;
        let _ = self.state_tx.send_replace(next);
    }

    async fn terminate(
        &self,
        session: &mut UpstreamSession,
        reason: TerminationReason,
    ) -> TerminationReason {
        session.source.stop().await;
        gauge!(UPSTREAM_CONNECTED).set(0.0);
        self.transition(session, SessionState::Terminated);
        info!(?reason, "upstream supervisor terminated");
        reason
    }
}
