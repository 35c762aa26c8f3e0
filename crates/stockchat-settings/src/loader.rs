//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StockchatSettings::default()`]
//! 2. If `~/.stockchat/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::StockchatSettings;

/// Data directory (`~/.stockchat`).
pub fn stockchat_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".stockchat")
}

/// Resolve the path to the settings file (`~/.stockchat/settings.json`).
pub fn settings_path() -> PathBuf {
    stockchat_home().join("settings.json")
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// placed under [`stockchat_home`].
pub fn resolve_path(configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        stockchat_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StockchatSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<StockchatSettings> {
    let defaults = serde_json::to_value(StockchatSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: StockchatSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })?;
    apply_env_overrides(&mut settings);
    Ok(settings)
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

/// Apply `STOCKCHAT_*` environment variable overrides.
///
/// Numbers must parse and fall inside their range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut StockchatSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (env in production, a map in tests).
pub fn apply_overrides<F>(settings: &mut StockchatSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = env.string("STOCKCHAT_LLM_ENDPOINT") {
        settings.backend.llm_endpoint = v;
    }
    if let Some(v) = env.u64("STOCKCHAT_RECONNECT_DELAY_MS", 100, 600_000) {
        settings.backend.reconnect_delay_ms = v;
    }
    if let Some(v) = env.u64("STOCKCHAT_REQUEST_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.backend.request_timeout_ms = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.i64("STOCKCHAT_USER_ID", 1, i64::MAX) {
        settings.session.user_id = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("STOCKCHAT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("STOCKCHAT_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("STOCKCHAT_DB_PATH") {
        settings.server.db_path = v;
    }
    if let Some(v) = env.bool("STOCKCHAT_REQUIRE_AUTH") {
        settings.server.require_auth = v;
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("STOCKCHAT_API_URL") {
        settings.client.api_url = Some(v);
    }
    if let Some(v) = env.string("STOCKCHAT_API_TOKEN") {
        settings.client.api_token = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("STOCKCHAT_LOG_LEVEL") {
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
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `i64` within a range.
pub fn parse_i64_range(val: &str, min: i64, max: i64) -> Option<i64> {
    let n: i64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn i64(&self, name: &str, min: i64, max: i64) -> Option<i64> {
        self.parsed(name, "i64", |v| parse_i64_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn overrides(pairs: &[(&str, &str)]) -> StockchatSettings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = StockchatSettings::default();
        apply_overrides(&mut settings, |name| map.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3000, "host": "127.0.0.1"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "127.0.0.1");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.backend, StockchatSettings::default().backend);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"backend": {"llmEndpoint": "https://llm.internal"}, "session": {"pageSize": 20}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.backend.llm_endpoint, "https://llm.internal");
        assert_eq!(settings.backend.reconnect_delay_ms, 3_000);
        assert_eq!(settings.session.page_size, 20);
        assert_eq!(settings.session.question_delay_ms, 100);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Parse { .. }));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let s = overrides(&[
            ("STOCKCHAT_LLM_ENDPOINT", "wss://backend"),
            ("STOCKCHAT_RECONNECT_DELAY_MS", "250"),
            ("STOCKCHAT_USER_ID", "42"),
            ("STOCKCHAT_PORT", "8088"),
            ("STOCKCHAT_API_URL", "http://localhost:8088"),
            ("STOCKCHAT_REQUIRE_AUTH", "yes"),
        ]);
        assert_eq!(s.backend.llm_endpoint, "wss://backend");
        assert_eq!(s.backend.reconnect_delay_ms, 250);
        assert_eq!(s.session.user_id, 42);
        assert_eq!(s.server.port, 8088);
        assert_eq!(s.client.api_url.as_deref(), Some("http://localhost:8088"));
        assert!(s.server.require_auth);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let s = overrides(&[
            ("STOCKCHAT_RECONNECT_DELAY_MS", "5"),
            ("STOCKCHAT_REQUEST_TIMEOUT_MS", "soon"),
            ("STOCKCHAT_USER_ID", "0"),
            ("STOCKCHAT_PORT", "70000"),
            ("STOCKCHAT_HOST", ""),
        ]);
        let d = StockchatSettings::default();
        assert_eq!(s, d);
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("65535", 1, 65535), Some(65535));
        assert_eq!(parse_u64_range("1000", 1000, 2000), Some(1000));
        assert_eq!(parse_u64_range("abc", 1000, 2000), None);
        assert_eq!(parse_i64_range("-3", 1, 10), None);
        assert_eq!(parse_i64_range("7", 1, 10), Some(7));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        assert_eq!(resolve_path("/var/db.sqlite"), PathBuf::from("/var/db.sqlite"));
        assert!(resolve_path("stockchat.db").ends_with(".stockchat/stockchat.db"));
    }
}
