//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CallwireSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::CallwireSettings;

pub(crate) fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Resolve the default settings file (`~/.callwire/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".callwire").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CallwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CallwireSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<CallwireSettings> {
    let defaults = serde_json::to_value(CallwireSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut CallwireSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_overrides_from<F>(settings: &mut CallwireSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLWIRE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CALLWIRE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64("CALLWIRE_HEARTBEAT_INTERVAL", 0, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = env.string("JWT_ALGORITHM") {
        settings.auth.jwt_algorithm = v.trim().to_string();
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLWIRE_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.bool("CALLWIRE_CALL_TRACKING") {
        settings.database.call_tracking = v;
    }

    // ── CORS ────────────────────────────────────────────────────────
    let mut extra = Vec::new();
    if let Some(v) = env.string("FRONTEND_ORIGIN") {
        extra.push(v.trim().to_string());
    }
    if let Some(v) = env.string("FRONTEND_ORIGINS") {
        extra.extend(split_origins(&v));
    }
    if !extra.is_empty() {
        extra.append(&mut settings.cors.allowed_origins);
        settings.cors.allowed_origins = dedup_preserving_order(extra);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CALLWIRE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated origin list, dropping blanks.
pub fn split_origins(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}
