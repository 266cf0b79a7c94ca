//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TheurgySettings::default()`]
//! 2. If `~/.theurgy/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `THEURGY_*` environment variable overrides
//! 4. Clamp out-of-range values via [`TheurgySettings::validate`]

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TheurgySettings;

/// Resolve the path to the settings file (`~/.theurgy/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".theurgy").join("settings.json")
}

/// Load settings from the default path.
pub fn load_settings() -> Result<TheurgySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TheurgySettings> {
    let defaults = serde_json::to_value(TheurgySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TheurgySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced by `source`,
/// and `null` in `source` keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Unparseable values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut TheurgySettings) {
    if let Some(v) = read_env_string("THEURGY_MODEL") {
        settings.generation.model = v;
    }
    if let Some(v) = read_env_u64("THEURGY_GENERATION_TIMEOUT", 1, 600) {
        settings.generation.timeout_seconds = v;
    }
    if let Some(v) = read_env_string("THEURGY_HISTORY_DB") {
        settings.history.database_path = v;
    }
    if let Some(v) = read_env_u64("THEURGY_GLOBAL_MAX_COMMANDS", 0, 64) {
        settings.limits.global_max_commands = Some(v as u32);
    }
    if let Some(v) = read_env_string("THEURGY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("THEURGY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitively.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within an inclusive range.
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

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── deep_merge ──────────────────────────────────────────────────────

    #[test]
    fn merge_nested_objects() {
        let merged = deep_merge(
            json!({"generation": {"model": "a", "topK": 10}}),
            json!({"generation": {"model": "b"}}),
        );
        assert_eq!(merged["generation"]["model"], "b");
        assert_eq!(merged["generation"]["topK"], 10);
    }

    #[test]
    fn merge_replaces_arrays() {
        let merged = deep_merge(json!({"p": ["a", "b"]}), json!({"p": ["c"]}));
        assert_eq!(merged["p"], json!(["c"]));
    }

    #[test]
    fn merge_skips_null() {
        let merged = deep_merge(json!({"x": 1}), json!({"x": null}));
        assert_eq!(merged["x"], 1);
    }

    // ── parsing ─────────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("perhaps"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("1", 1, 600), Some(1));
        assert_eq!(parse_u64_range("600", 1, 600), Some(600));
        assert_eq!(parse_u64_range("0", 1, 600), None);
        assert_eq!(parse_u64_range("abc", 1, 600), None);
    }

    // ── file loading ────────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s.history.max_entries, 1000);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"history": {"maxEntries": 50}, "session": {"endPhrases": ["Begone"]}}"#,
        )
        .unwrap();
        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.history.max_entries, 50);
        assert_eq!(s.history.prompt_window, 6);
        assert_eq!(s.session.end_phrases, ["begone"]);
        assert_eq!(s.session.accept_prefixes, ["yes", "accept"]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn loaded_values_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"generation": {"temperature": 9.5}}"#).unwrap();
        let s = load_settings_from_path(&path).unwrap();
        assert!((s.generation.temperature - 2.0).abs() < f64::EPSILON);
    }
}
