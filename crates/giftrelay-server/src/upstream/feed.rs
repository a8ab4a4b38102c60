//! WebSocket JSON feed upstream.
//!
//! Connects to a `ws://` endpoint that pushes one [`UpstreamEvent`] JSON
//! object per text frame. Frames that fail to parse are skipped.

use async_trait::async_trait;
use futures::StreamExt;
use giftrelay_core::{UpstreamError, UpstreamEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::UpstreamSource;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upstream reading events from a WebSocket feed.
pub struct FeedSource {
    url: String,
    stream: Option<FeedStream>,
}

impl FeedSource {
    /// Feed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }

    /// The feed URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a feed connection is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl UpstreamSource for FeedSource {
    async fn connect(&mut self) -> Result<(), UpstreamError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| UpstreamError::Connect(format!("{}: {e}", self.url)))?;
        info!(url = %self.url, "feed connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, UpstreamError> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            let Some(frame) = stream.next().await else {
                self.stream = None;
                return Ok(None);
            };
            match frame {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<UpstreamEvent>(text.as_str()) {
                        Ok(event) => return Ok(Some(event)),
                        Err(e) => {
                            warn!(error = %e, len = text.len(), "skipping unparseable feed frame");
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "feed sent close");
                    self.stream = None;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    self.stream = None;
                    return Err(UpstreamError::Protocol(e.to_string()));
                }
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
            debug!(url = %self.url, "feed closed");
        }
    }
}
