//! Event types flowing through the relay.
//!
//! Two families:
//!
//! - **[`UpstreamEvent`]**: what the upstream live-event source reports, one
//!   variant per callback (`connect`, `gift`, `comment`, `disconnect`,
//!   `error`). Optional fields are tolerated and defaulted here.
//! - **[`Event`]**: the normalized relay event with a timestamp on every
//!   variant. This is what the supervisor hands to the event sink and what
//!   the dispatcher turns into wire messages.

use serde::{Deserialize, Deserializer, Serialize};

/// Current time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identity of the audience member behind an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable user identifier (unique id / handle).
    pub user_id: String,
    /// Display name.
    pub nickname: String,
}

/// The gift part of a gift event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftInfo {
    /// Upstream gift identifier.
    pub gift_id: String,
    /// Gift name; this is the key into the effect catalog.
    pub name: String,
    /// How many gifts were sent in this combo.
    pub repeat_count: u32,
    /// Whether the combo is still in progress.
    pub is_streaking: bool,
}

/// Discriminant of [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Upstream session established.
    Connected,
    /// A gift arrived.
    GiftReceived,
    /// A chat comment arrived.
    Comment,
    /// Upstream session dropped.
    Disconnected,
    /// Upstream reported an error.
    Error,
}

impl EventKind {
    /// Stable name used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::GiftReceived => "gift_received",
            Self::Comment => "comment",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// A normalized relay event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The upstream session is connected.
    Connected {
        /// When the connection was established.
        timestamp: i64,
    },
    /// A gift was received.
    GiftReceived {
        /// Sender.
        user: UserInfo,
        /// Gift details.
        gift: GiftInfo,
        /// Upstream timestamp.
        timestamp: i64,
    },
    /// A chat comment was received.
    Comment {
        /// Commenter's user id.
        user_id: String,
        /// Comment text.
        message: String,
        /// Upstream timestamp.
        timestamp: i64,
    },
    /// The upstream session disconnected.
    Disconnected {
        /// Reason given by the source, or a supervisor description.
        reason: String,
        /// When the disconnect was observed.
        timestamp: i64,
    },
    /// The upstream reported an error or a connect attempt failed.
    Error {
        /// Human-readable description.
        description: String,
        /// When the error was observed.
        timestamp: i64,
    },
}

impl Event {
    /// The event's kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::GiftReceived { .. } => EventKind::GiftReceived,
            Self::Comment { .. } => EventKind::Comment,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// The event's timestamp (Unix epoch milliseconds).
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Connected { timestamp }
            | Self::GiftReceived { timestamp, .. }
            | Self::Comment { timestamp, .. }
            | Self::Disconnected { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// A `Connected` event stamped now.
    pub fn connected_now() -> Self {
        Self::Connected {
            timestamp: now_millis(),
        }
    }

    /// A `Disconnected` event stamped now.
    pub fn disconnected_now(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
            timestamp: now_millis(),
        }
    }

    /// An `Error` event stamped now.
    pub fn error_now(description: impl Into<String>) -> Self {
        Self::Error {
            description: description.into(),
            timestamp: now_millis(),
        }
    }
}

/// One callback from the upstream live-event source.
///
/// JSON form is internally tagged by `type` with camelCase fields, e.g.
/// `{"type":"gift","userId":"alice","giftName":"Rose","repeatCount":3}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamEvent {
    /// `OnConnect(timestamp)`.
    Connect {
        /// Connection time; defaults to now.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// `OnGift(userId, userNickname, giftId, giftName, repeatCount, isStreaking, timestamp)`.
    #[serde(rename_all = "camelCase")]
    Gift {
        /// Sender id.
        user_id: String,
        /// Sender display name; defaults to the id.
        #[serde(default)]
        user_nickname: Option<String>,
        /// Gift identifier; numbers are accepted and stringified.
        #[serde(default, deserialize_with = "string_or_number")]
        gift_id: Option<String>,
        /// Gift name.
        gift_name: String,
        /// Combo count; defaults to 1.
        #[serde(default)]
        repeat_count: Option<u32>,
        /// Combo in progress; defaults to false.
        #[serde(default)]
        is_streaking: Option<bool>,
        /// Upstream timestamp; defaults to now.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// `OnComment(userId, message, timestamp)`.
    #[serde(rename_all = "camelCase")]
    Comment {
        /// Commenter id.
        user_id: String,
        /// Comment text.
        message: String,
        /// Upstream timestamp; defaults to now.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// `OnDisconnect(reason)`.
    Disconnect {
        /// Why the session ended.
        #[serde(default)]
        reason: Option<String>,
    },
    /// `OnError(description)`.
    Error {
        /// What went wrong.
        description: String,
    },
}

impl UpstreamEvent {
    /// Normalize into a relay [`Event`], filling defaults.
    pub fn into_event(self) -> Event {
        match self {
            Self::Connect { timestamp } => Event::Connected {
                timestamp: timestamp.unwrap_or_else(now_millis),
            },
            Self::Gift {
                user_id,
                user_nickname,
                gift_id,
                gift_name,
                repeat_count,
                is_streaking,
                timestamp,
            } => Event::GiftReceived {
                user: UserInfo {
                    nickname: user_nickname.unwrap_or_else(|| user_id.clone()),
                    user_id,
                },
                gift: GiftInfo {
                    gift_id: gift_id.unwrap_or_default(),
                    name: gift_name,
                    repeat_count: repeat_count.unwrap_or(1),
                    is_streaking: is_streaking.unwrap_or(false),
                },
                timestamp: timestamp.unwrap_or_else(now_millis),
            },
            Self::Comment {
                user_id,
                message,
                timestamp,
            } => Event::Comment {
                user_id,
                message,
                timestamp: timestamp.unwrap_or_else(now_millis),
            },
            Self::Disconnect { reason } => {
                Event::disconnected_now(reason.unwrap_or_else(|| "upstream closed".into()))
            }
            Self::Error { description } => Event::error_now(description),
        }
    }

    /// Whether this callback ends the upstream session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnect { .. } | Self::Error { .. })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn gift_defaults_are_applied() {
        let raw = r#"{"type":"gift","userId":"alice","giftName":"Rose"}"#;
        let upstream: UpstreamEvent = serde_json::from_str(raw).unwrap();
        let event = upstream.into_event();
        assert_matches!(event, Event::GiftReceived { user, gift, .. } => {
            assert_eq!(user.user_id, "alice");
            assert_eq!(user.nickname, "alice");
            assert_eq!(gift.name, "Rose");
            assert_eq!(gift.repeat_count, 1);
            assert!(!gift.is_streaking);
            assert_eq!(gift.gift_id, "");
        });
    }

    #[test]
    fn gift_fields_are_kept() {
        let raw = r#"{"type":"gift","userId":"alice","userNickname":"Alice","giftId":5655,
            "giftName":"Rose","repeatCount":3,"isStreaking":true,"timestamp":1700000000000}"#;
        let event = serde_json::from_str::<UpstreamEvent>(raw).unwrap().into_event();
        assert_eq!(event.timestamp(), 1_700_000_000_000);
        assert_matches!(event, Event::GiftReceived { user, gift, .. } => {
            assert_eq!(user.nickname, "Alice");
            assert_eq!(gift.gift_id, "5655");
            assert_eq!(gift.repeat_count, 3);
            assert!(gift.is_streaking);
        });
    }

    #[test]
    fn gift_id_accepts_strings() {
        let raw = r#"{"type":"gift","userId":"u","giftId":"abc123","giftName":"Heart"}"#;
        let event = serde_json::from_str::<UpstreamEvent>(raw).unwrap().into_event();
        assert_matches!(event, Event::GiftReceived { gift, .. } => {
            assert_eq!(gift.gift_id, "abc123");
        });
    }

    #[test]
    fn comment_parses() {
        let raw = r#"{"type":"comment","userId":"bob","message":"hi","timestamp":42}"#;
        let event = serde_json::from_str::<UpstreamEvent>(raw).unwrap().into_event();
        assert_eq!(
            event,
            Event::Comment {
                user_id: "bob".into(),
                message: "hi".into(),
                timestamp: 42,
            }
        );
        assert_eq!(event.kind(), EventKind::Comment);
    }

    #[test]
    fn connect_without_timestamp_is_stamped_now() {
        let before = now_millis();
        let event = serde_json::from_str::<UpstreamEvent>(r#"{"type":"connect"}"#)
            .unwrap()
            .into_event();
        assert_eq!(event.kind(), EventKind::Connected);
        assert!(event.timestamp() >= before);
    }

    #[test]
    fn disconnect_without_reason() {
        let upstream: UpstreamEvent = serde_json::from_str(r#"{"type":"disconnect"}"#).unwrap();
        assert!(upstream.is_terminal());
        assert_matches!(upstream.into_event(), Event::Disconnected { reason, .. } => {
            assert_eq!(reason, "upstream closed");
        });
    }

    #[test]
    fn error_is_terminal() {
        let upstream = UpstreamEvent::Error {
            description: "rate limited".into(),
        };
        assert!(upstream.is_terminal());
        assert_eq!(upstream.into_event().kind(), EventKind::Error);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<UpstreamEvent>(r#"{"type":"like"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn gift_without_name_is_rejected() {
        let result = serde_json::from_str::<UpstreamEvent>(r#"{"type":"gift","userId":"u"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn kind_names() {
        assert_eq!(EventKind::GiftReceived.as_str(), "gift_received");
        assert_eq!(Event::error_now("x").kind().as_str(), "error");
    }
}
