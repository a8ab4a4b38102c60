//! Simulated upstream for local development and demos.
//!
//! Emits a connect callback, then a random gift every 3–8 seconds with an
//! occasional chat comment in between.

use std::time::Duration;

use async_trait::async_trait;
use giftrelay_core::events::now_millis;
use giftrelay_core::{UpstreamError, UpstreamEvent};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::UpstreamSource;

/// Gift names the simulator picks from.
pub const GIFTS: &[&str] = &[
    "Rose",
    "Heart",
    "Like",
    "Lollipop",
    "Ice Cream",
    "Cupcake",
    "Pizza",
    "Cake",
    "Coffee",
    "Diamond",
    "Rocket",
    "Dragon",
    "Galaxy",
    "Universe",
    "TikTok King",
];

/// Viewer names the simulator picks from.
pub const USERS: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Judy",
];

const COMMENTS: &[&str] = &[
    "this is amazing",
    "hello from the chat",
    "love the effects",
    "let's go!",
    "first time here",
];

const MIN_GAP_MS: u64 = 3_000;
const MAX_GAP_MS: u64 = 8_000;
const COMMENT_CHANCE: f64 = 0.2;

/// Random gift generator standing in for a live stream.
pub struct SimulatedSource {
    rng: StdRng,
    connected: bool,
    greeted: bool,
}

impl SimulatedSource {
    /// Simulator seeded from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic simulator.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            connected: false,
            greeted: false,
        }
    }

    fn next_gap(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(MIN_GAP_MS..=MAX_GAP_MS))
    }

    fn pick(&mut self, options: &[&str]) -> String {
        options.choose(&mut self.rng).copied().unwrap_or_default().to_owned()
    }

    fn random_event(&mut self) -> UpstreamEvent {
        let user = self.pick(USERS);
        if self.rng.random_bool(COMMENT_CHANCE) {
            return UpstreamEvent::Comment {
                user_id: user,
                message: self.pick(COMMENTS),
                timestamp: Some(now_millis()),
            };
        }
        let gift_id: u32 = self.rng.random_range(1_000..100_000);
        UpstreamEvent::Gift {
            user_nickname: Some(user.clone()),
            user_id: user.to_lowercase(),
            gift_id: Some(gift_id.to_string()),
            gift_name: self.pick(GIFTS),
            repeat_count: Some(self.rng.random_range(1..=5)),
            is_streaking: Some(false),
            timestamp: Some(now_millis()),
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamSource for SimulatedSource {
    async fn connect(&mut self) -> Result<(), UpstreamError> {
        self.connected = true;
        self.greeted = false;
        debug!("simulated upstream connected");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, UpstreamError> {
        if !self.connected {
            return Ok(None);
        }
        if !self.greeted {
            self.greeted = true;
            return Ok(Some(UpstreamEvent::Connect {
                timestamp: Some(now_millis()),
            }));
        }
        tokio::time::sleep(self.next_gap()).await;
        Ok(Some(self.random_event()))
    }

    async fn stop(&mut self) {
        self.connected = false;
    }
}
