//! Upstream live-event sources.
//!
//! A source is driven exclusively by the connection supervisor: it calls
//! [`UpstreamSource::connect`], then pulls callbacks with
//! [`UpstreamSource::next_event`] until the session ends, and finally
//! [`UpstreamSource::stop`].

pub mod feed;
pub mod simulated;

use async_trait::async_trait;
use giftrelay_core::{UpstreamError, UpstreamEvent};

pub use feed::FeedSource;
pub use simulated::SimulatedSource;

/// A connection to an external live-event source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamSource: Send {
    /// Establish the session.
    async fn connect(&mut self) -> Result<(), UpstreamError>;

    /// Wait for the next callback.
    ///
    /// `Ok(None)` means the source ended the session cleanly.
    async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, UpstreamError>;

    /// Tear the session down. Safe to call when not connected.
    async fn stop(&mut self);
}
