//! # giftrelay-core
//!
//! Shared vocabulary for the gift relay:
//!
//! - **Events**: [`events::UpstreamEvent`] (one variant per upstream
//!   callback) normalized into [`events::Event`]
//! - **Effects**: [`effects::EffectMapper`], a total gift → effect lookup
//! - **Wire**: [`wire::WireMessage`], the JSON sent to subscribers
//! - **Errors**: [`errors::RelayError`] taxonomy via `thiserror`
//! - **Retry**: [`retry::BackoffPolicy`] for upstream reconnects
//! - **IDs**: [`ids::SubscriberId`]

#![deny(unsafe_code)]

pub mod effects;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod retry;
pub mod wire;

pub use effects::{EffectDescriptor, EffectMapper};
pub use errors::{ErrorCategory, RelayError, SendFailure, UpstreamError};
pub use events::{Event, EventKind, GiftInfo, UpstreamEvent, UserInfo};
pub use ids::SubscriberId;
pub use retry::BackoffPolicy;
pub use wire::{ClientMessage, WireEventType, WireMessage};
