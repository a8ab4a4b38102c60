//! Error taxonomy for the relay.
//!
//! - [`UpstreamError`]: what an upstream live-event source reports when a
//!   connect or receive fails.
//! - [`RelayError`]: the categorized failures of the relay engine. Every
//!   failure path returns one of these instead of relying on a catch-all.
//! - [`ErrorCategory`]: coarse classification used for logging and for the
//!   retry decision.
//!
//! Only [`RelayError::FatalUpstream`] is escalated to the top-level caller;
//! every other variant is recovered where it happens.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::SubscriberId;

/// Failure reported by an upstream live-event source.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The source sent something it should not have.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The source closed the connection.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Categorized relay failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connect or network failure before the attempt budget is exhausted.
    #[error("upstream failure (attempt {attempt}): {source}")]
    TransientUpstream {
        /// Attempt counter after this failure.
        attempt: u32,
        /// Underlying upstream failure.
        #[source]
        source: UpstreamError,
    },

    /// The reconnection budget was exhausted.
    #[error("upstream unavailable after {attempts} attempts")]
    FatalUpstream {
        /// Number of attempts made.
        attempts: u32,
        /// Last upstream failure, if any.
        last_error: Option<UpstreamError>,
    },

    /// Delivery to one subscriber failed; the subscriber is evicted.
    #[error("send to subscriber {subscriber_id} failed: {reason}")]
    SubscriberSend {
        /// The failing subscriber.
        subscriber_id: SubscriberId,
        /// Why the send failed.
        reason: SendFailure,
    },

    /// An event could not be serialized to the wire format and was dropped.
    #[error("failed to serialize {event_kind} event: {source}")]
    Serialization {
        /// Kind of the dropped event.
        event_kind: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A shutdown step exceeded its bound.
    #[error("shutdown step '{step}' exceeded {timeout:?}")]
    ShutdownTimeout {
        /// Name of the teardown step.
        step: &'static str,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The subscriber registry is at capacity.
    #[error("subscriber registry full ({capacity} connections)")]
    RegistryFull {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Why a send to a subscriber failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendFailure {
    /// The subscriber's transport is closed.
    Closed,
    /// The send did not complete before the broadcast deadline.
    TimedOut,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("transport closed"),
            Self::TimedOut => f.write_str("deadline exceeded"),
        }
    }
}

/// Coarse error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Upstream problem that a retry may fix.
    Transient,
    /// Upstream problem that ends the session.
    Fatal,
    /// Problem confined to one subscriber.
    Subscriber,
    /// Problem confined to one event.
    Event,
    /// Problem during teardown.
    Shutdown,
    /// Resource limit reached.
    Capacity,
}

impl RelayError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientUpstream { .. } => ErrorCategory::Transient,
            Self::FatalUpstream { .. } => ErrorCategory::Fatal,
            Self::SubscriberSend { .. } => ErrorCategory::Subscriber,
            Self::Serialization { .. } => ErrorCategory::Event,
            Self::ShutdownTimeout { .. } => ErrorCategory::Shutdown,
            Self::RegistryFull { .. } => ErrorCategory::Capacity,
        }
    }

    /// Whether the supervisor should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. })
    }

    /// Whether this error must be surfaced to the top-level caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalUpstream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn transient_is_retryable() {
        let err = RelayError::TransientUpstream {
            attempt: 2,
            source: UpstreamError::Connect("refused".into()),
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(
            err.to_string(),
            "upstream failure (attempt 2): connect failed: refused"
        );
    }

    #[test]
    fn fatal_is_not_retryable() {
        let err = RelayError::FatalUpstream {
            attempts: 5,
            last_error: None,
        };
        assert!(!err.is_retryable());
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "upstream unavailable after 5 attempts");
    }

    #[test]
    fn subscriber_send_display() {
        let err = RelayError::SubscriberSend {
            subscriber_id: SubscriberId::from("sub_1"),
            reason: SendFailure::TimedOut,
        };
        assert_eq!(err.category(), ErrorCategory::Subscriber);
        assert_eq!(
            err.to_string(),
            "send to subscriber sub_1 failed: deadline exceeded"
        );
    }

    #[test]
    fn serialization_keeps_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = RelayError::Serialization {
            event_kind: "gift",
            source: json_err,
        };
        assert_eq!(err.category(), ErrorCategory::Event);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn shutdown_timeout_display() {
        let err = RelayError::ShutdownTimeout {
            step: "close_subscribers",
            timeout: Duration::from_secs(3),
        };
        assert_matches!(err.category(), ErrorCategory::Shutdown);
        assert!(err.to_string().contains("close_subscribers"));
    }

    #[test]
    fn registry_full_category() {
        let err = RelayError::RegistryFull { capacity: 2 };
        assert_eq!(err.category(), ErrorCategory::Capacity);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::Subscriber).unwrap();
        assert_eq!(json, "\"subscriber\"");
    }
}
