//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `GIFTRELAY_*` environment overrides (highest priority short of CLI flags)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Resolve the path to the settings file (`~/.giftrelay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".giftrelay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error. The merged
/// result is validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<RelaySettings> {
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(RelaySettings::default()).map_err(malformed)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(malformed)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Out-of-range or unparsable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    if let Some(v) = read_env_string("GIFTRELAY_TARGET") {
        settings.target = v;
    }

    if let Some(v) = read_env_string("GIFTRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("GIFTRELAY_PORT", 1, 65535) {
        settings.server.port = v;
    }

    if let Some(v) = read_env_u32("GIFTRELAY_MAX_ATTEMPTS", 1, 100) {
        settings.upstream.max_attempts = v;
    }
    if let Some(v) = read_env_u64("GIFTRELAY_BACKOFF_CAP_SECS", 1, 3600) {
        settings.upstream.backoff_cap_secs = v;
    }
    if let Some(v) = read_env_string("GIFTRELAY_FEED_URL") {
        settings.upstream.feed_url = Some(v);
    }
    if let Some(v) = read_env_bool("GIFTRELAY_SIMULATE") {
        settings.upstream.simulate = v;
    }

    if let Some(v) = read_env_string("GIFTRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // ── parse_bool ──────────────────────────────────────────────────

    #[test]
    fn parse_bool_accepts_truthy() {
        for v in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
    }

    #[test]
    fn parse_bool_accepts_falsy() {
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // ── range parsers ───────────────────────────────────────────────

    #[test]
    fn port_range() {
        assert_eq!(parse_u16_range("8765", 1, 65535), Some(8765));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
    }

    #[test]
    fn max_attempts_range() {
        assert_eq!(parse_u32_range("5", 1, 100), Some(5));
        assert_eq!(parse_u32_range("0", 1, 100), None);
        assert_eq!(parse_u32_range("101", 1, 100), None);
        assert_eq!(parse_u32_range("-1", 1, 100), None);
    }

    #[test]
    fn backoff_cap_range() {
        assert_eq!(parse_u64_range("30", 1, 3600), Some(30));
        assert_eq!(parse_u64_range("3600", 1, 3600), Some(3600));
        assert_eq!(parse_u64_range("3601", 1, 3600), None);
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn deep_merge_overrides_nested_key() {
        let target = json!({"server": {"host": "127.0.0.1", "port": 8765}});
        let source = json!({"server": {"port": 9000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"server": {"host": "127.0.0.1", "port": 9000}}));
    }

    #[test]
    fn deep_merge_skips_null() {
        let target = json!({"target": "alice"});
        let merged = deep_merge(target, json!({"target": null}));
        assert_eq!(merged["target"], "alice");
    }

    #[test]
    fn deep_merge_replaces_primitives_and_adds_keys() {
        let target = json!({"a": 1});
        let merged = deep_merge(target, json!({"a": 2, "b": [1, 2]}));
        assert_eq!(merged, json!({"a": 2, "b": [1, 2]}));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn load_partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"target": "somecreator", "upstream": {"maxAttempts": 3}}"#,
        )
        .unwrap();
        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.target, "somecreator");
        assert_eq!(settings.upstream.max_attempts, 3);
        assert_eq!(settings.upstream.backoff_cap_secs, 30);
        assert_eq!(settings.server.port, 8765);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Malformed { path: p, .. }) if p == path);
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "high"}}"#).unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Malformed { path: p, .. }) if p == path);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"upstream": {"backoffBase": 1}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert_eq!(err.field(), Some("upstream.backoffBase"));
    }

    #[test]
    fn settings_path_is_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".giftrelay/settings.json"));
    }
}
