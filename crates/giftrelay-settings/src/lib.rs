//! # giftrelay-settings
//!
//! Layered configuration for the relay. Settings are loaded from, in
//! priority order:
//! 1. **Compiled defaults** from [`RelaySettings::default()`]
//! 2. **User file** `~/.giftrelay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** `GIFTRELAY_*`
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```no_run
//! let settings = giftrelay_settings::load_settings().unwrap_or_default();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = RelaySettings::default();
        assert_eq!(settings.server.port, 8765);
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged, serde_json::json!({"x": 1, "y": 2}));
    }
}
