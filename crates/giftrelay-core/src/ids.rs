//! Branded ID newtypes.
//!
//! Subscriber identifiers are opaque strings wrapped in a newtype so a
//! subscriber ID can never be confused with a gift or user identifier.
//! Freshly minted IDs are UUID v7 (time-ordered) with a `sub_` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of one downstream subscriber connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Mint a new time-ordered subscriber ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("sub_{}", Uuid::now_v7()))
    }

    /// Wrap an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for SubscriberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_ids_carry_prefix() {
        let id = SubscriberId::new();
        assert!(id.as_str().starts_with("sub_"));
    }

    #[test]
    fn new_ids_are_time_ordered() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert!(a < b);
    }

    #[test]
    fn display_matches_inner() {
        let id = SubscriberId::from("sub_fixed");
        assert_eq!(id.to_string(), "sub_fixed");
    }

    #[test]
    fn serde_is_transparent() {
        let id = SubscriberId::from("sub_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sub_abc\"");
        let back: SubscriberId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
