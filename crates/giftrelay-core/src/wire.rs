//! Downstream wire format.
//!
//! One JSON object per message:
//!
//! ```text
//! { "event": "stream_connected" | "gift_received" | "comment" | "error"
//!            | "connection_established" | "pong",
//!   "user": ..., "gift": {...}, "effect": {...}, "message": "...",
//!   "data": {...}, "timestamp": <epoch ms> }
//! ```
//!
//! Absent parts are omitted, not sent as `null`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effects::{EffectDescriptor, EffectMapper};
use crate::errors::RelayError;
use crate::events::{Event, GiftInfo, UserInfo, now_millis};
use crate::ids::SubscriberId;

/// Value of the `event` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEventType {
    /// Upstream session connected.
    StreamConnected,
    /// Gift with its effect descriptor.
    GiftReceived,
    /// Chat comment.
    Comment,
    /// Upstream error or disconnect, or a relay-side rejection.
    Error,
    /// Greeting sent to each new subscriber.
    ConnectionEstablished,
    /// Reply to a subscriber ping.
    Pong,
}

/// Value of the `user` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireUser {
    /// Full profile, used for gifts.
    Profile {
        /// Unique id.
        username: String,
        /// Display name.
        nickname: String,
    },
    /// Bare identity, used for comments and stream status.
    Handle(String),
}

/// Value of the `gift` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGift {
    /// Gift name.
    pub name: String,
    /// Upstream gift id.
    pub id: String,
    /// Combo count.
    pub repeat_count: u32,
    /// Combo in progress.
    pub is_streaking: bool,
}

impl From<&GiftInfo> for WireGift {
    fn from(gift: &GiftInfo) -> Self {
        Self {
            name: gift.name.clone(),
            id: gift.gift_id.clone(),
            repeat_count: gift.repeat_count,
            is_streaking: gift.is_streaking,
        }
    }
}

impl From<&UserInfo> for WireUser {
    fn from(user: &UserInfo) -> Self {
        Self::Profile {
            username: user.user_id.clone(),
            nickname: user.nickname.clone(),
        }
    }
}

/// One outbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message type.
    pub event: WireEventType,
    /// Who the message is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<WireUser>,
    /// Gift details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift: Option<WireGift>,
    /// Effect to render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectDescriptor>,
    /// Free text (comment body, error description).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireMessage {
    fn bare(event: WireEventType) -> Self {
        Self {
            event,
            user: None,
            gift: None,
            effect: None,
            message: None,
            data: None,
            timestamp: None,
        }
    }

    /// Build the wire form of a relay event. Gifts get their effect from `mapper`.
    pub fn from_event(event: &Event, mapper: &EffectMapper, target: &str) -> Self {
        match event {
            Event::Connected { timestamp } => Self {
                user: Some(WireUser::Handle(target.to_owned())),
                timestamp: Some(*timestamp),
                ..Self::bare(WireEventType::StreamConnected)
            },
            Event::GiftReceived {
                user,
                gift,
                timestamp,
            } => Self {
                user: Some(user.into()),
                gift: Some(gift.into()),
                effect: Some(mapper.map(&gift.name).clone()),
                timestamp: Some(*timestamp),
                ..Self::bare(WireEventType::GiftReceived)
            },
            Event::Comment {
                user_id,
                message,
                timestamp,
            } => Self {
                user: Some(WireUser::Handle(user_id.clone())),
                message: Some(message.clone()),
                timestamp: Some(*timestamp),
                ..Self::bare(WireEventType::Comment)
            },
            Event::Disconnected { reason, timestamp } => Self {
                user: Some(WireUser::Handle(target.to_owned())),
                message: Some(format!("stream disconnected: {reason}")),
                timestamp: Some(*timestamp),
                ..Self::bare(WireEventType::Error)
            },
            Event::Error {
                description,
                timestamp,
            } => Self {
                message: Some(description.clone()),
                timestamp: Some(*timestamp),
                ..Self::bare(WireEventType::Error)
            },
        }
    }

    /// Greeting sent to a subscriber right after it connects.
    pub fn connection_established(target: &str, status: &str, subscriber: &SubscriberId) -> Self {
        Self {
            user: Some(WireUser::Handle(target.to_owned())),
            data: Some(serde_json::json!({
                "status": status,
                "subscriber_id": subscriber,
            })),
            timestamp: Some(now_millis()),
            ..Self::bare(WireEventType::ConnectionEstablished)
        }
    }

    /// Reply to a subscriber ping.
    pub fn pong(timestamp: i64) -> Self {
        Self {
            data: Some(serde_json::json!({ "timestamp": timestamp })),
            ..Self::bare(WireEventType::Pong)
        }
    }

    /// Relay-side error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            timestamp: Some(now_millis()),
            ..Self::bare(WireEventType::Error)
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Serialize a relay event into a shareable frame.
pub fn encode_event(
    event: &Event,
    mapper: &EffectMapper,
    target: &str,
) -> Result<Arc<str>, RelayError> {
    WireMessage::from_event(event, mapper, target)
        .to_json()
        .map(Arc::from)
        .map_err(|source| RelayError::Serialization {
            event_kind: event.kind().as_str(),
            source,
        })
}

/// A message sent by a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Keepalive request.
    Ping,
    /// Valid JSON we do not act on.
    Other,
}

/// Parse a subscriber frame. Returns `None` for non-JSON input.
///
/// Both `{"type":"ping"}` and `{"event":"ping"}` are treated as pings.
pub fn parse_client_message(text: &str) -> Option<ClientMessage> {
    let value: Value = serde_json::from_str(text).ok()?;
    let tag = value
        .get("type")
        .or_else(|| value.get("event"))
        .and_then(Value::as_str);
    Some(match tag {
        Some("ping") => ClientMessage::Ping,
        _ => ClientMessage::Other,
    })
}
