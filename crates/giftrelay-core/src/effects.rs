//! Gift → visual effect mapping.
//!
//! [`EffectMapper::map`] is total: every gift identifier yields exactly one
//! [`EffectDescriptor`], either from the catalog or the fixed
//! [`EffectDescriptor::fallback`]. The relay only produces descriptors; the
//! renderer that draws them lives downstream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lowest allowed effect intensity.
pub const MIN_INTENSITY: u8 = 1;
/// Highest allowed effect intensity.
pub const MAX_INTENSITY: u8 = 10;

/// Immutable description of a visual effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    /// Effect type consumed by the renderer (e.g. `"shooting_star"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Strength on a 1–10 scale.
    pub intensity: u8,
    /// `#RRGGBB` color.
    pub color: String,
    /// Particle count.
    pub particles: u32,
    /// Sound identifier.
    pub sound: String,
}

impl EffectDescriptor {
    /// Build a descriptor.
    pub fn new(kind: &str, intensity: u8, color: &str, particles: u32, sound: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            intensity,
            color: color.to_owned(),
            particles,
            sound: sound.to_owned(),
        }
    }

    /// The low-intensity descriptor used for any unknown gift.
    pub fn fallback() -> Self {
        Self::new("default_sparkle", 1, "#FFFFFF", 100, "gentle_ping")
    }

    /// Check the value ranges (intensity 1–10, `#RRGGBB` color, non-empty type).
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.is_empty() {
            return Err("effect type must not be empty".into());
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&self.intensity) {
            return Err(format!(
                "intensity {} outside {MIN_INTENSITY}..={MAX_INTENSITY}",
                self.intensity
            ));
        }
        if !is_hex_color(&self.color) {
            return Err(format!("color '{}' is not #RRGGBB", self.color));
        }
        Ok(())
    }
}

/// Whether `s` is a `#RRGGBB` hex color.
pub fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// The built-in gift catalog.
pub fn builtin_catalog() -> HashMap<String, EffectDescriptor> {
    [
        (
            "Rose",
            EffectDescriptor::new("shooting_star", 3, "#FF69B4", 500, "cosmic_chime"),
        ),
        (
            "Heart",
            EffectDescriptor::new("dopamine_burst", 5, "#FF0080", 1000, "positive_affirmation"),
        ),
        (
            "Coins",
            EffectDescriptor::new("focus_coin_shower", 2, "#FFD700", 300, "coin_collect"),
        ),
        (
            "Universe",
            EffectDescriptor::new("hyperfocus_supernova", 10, "#8A2BE2", 5000, "universe_explosion"),
        ),
        (
            "Galaxy",
            EffectDescriptor::new("constellation_builder", 8, "#00CED1", 3000, "cosmic_harmony"),
        ),
    ]
    .into_iter()
    .map(|(name, effect)| (name.to_owned(), effect))
    .collect()
}

/// Pure lookup from gift identifier to effect descriptor.
#[derive(Clone, Debug)]
pub struct EffectMapper {
    catalog: HashMap<String, EffectDescriptor>,
    fallback: EffectDescriptor,
}

impl EffectMapper {
    /// Mapper over the built-in catalog.
    pub fn new() -> Self {
        Self {
            catalog: builtin_catalog(),
            fallback: EffectDescriptor::fallback(),
        }
    }

    /// Built-in catalog with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: HashMap<String, EffectDescriptor>) -> Self {
        let mut mapper = Self::new();
        mapper.catalog.extend(overrides);
        mapper
    }

    /// Look up the effect for a gift. Unknown gifts map to the fallback.
    pub fn map(&self, gift: &str) -> &EffectDescriptor {
        self.catalog.get(gift).unwrap_or(&self.fallback)
    }

    /// Whether the gift has a curated entry.
    pub fn is_known(&self, gift: &str) -> bool {
        self.catalog.contains_key(gift)
    }

    /// Number of curated entries.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

impl Default for EffectMapper {
    fn default() -> Self {
        Self::new()
    }
}
