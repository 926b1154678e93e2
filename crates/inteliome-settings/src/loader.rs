//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{InteliomeSettings, StorageBackend};

/// Resolve the path to the settings file (`~/.inteliome/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".inteliome").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<InteliomeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with process env overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<InteliomeSettings> {
    let mut settings = read_merged(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_merged(path: &Path) -> Result<InteliomeSettings> {
    let defaults = serde_json::to_value(InteliomeSettings::default())?;

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

/// Apply environment overrides. `lookup` resolves a variable name; tests
/// pass a closure over a map instead of touching the process environment.
///
/// Invalid values are ignored with a warning (file/default value stays).
pub fn apply_env_overrides<F>(settings: &mut InteliomeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Model ───────────────────────────────────────────────────────
    if let Some(v) = read("INTELIOME_MODEL") {
        settings.model.model = v;
    }
    if let Some(v) = read("INTELIOME_BASE_URL") {
        settings.model.base_url = v;
    }
    if let Some(v) = read("INTELIOME_TEMPERATURE") {
        match parse_f64_range(&v, 0.0, 2.0) {
            Some(t) => settings.model.temperature = t,
            None => warn_invalid("INTELIOME_TEMPERATURE", &v),
        }
    }

    // ── Conversation ────────────────────────────────────────────────
    if let Some(v) = read("INTELIOME_SUMMARIZE_AFTER") {
        match parse_usize_range(&v, 2, 10_000) {
            Some(n) => settings.conversation.summarize_after_turns = n,
            None => warn_invalid("INTELIOME_SUMMARIZE_AFTER", &v),
        }
    }
    if let Some(v) = read("INTELIOME_PRUNE_TRANSCRIPT") {
        match parse_bool(&v) {
            Some(b) => settings.conversation.prune_transcript = b,
            None => warn_invalid("INTELIOME_PRUNE_TRANSCRIPT", &v),
        }
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read("INTELIOME_STORAGE") {
        match v.parse::<StorageBackend>() {
            Ok(b) => settings.storage.backend = b,
            Err(_) => warn_invalid("INTELIOME_STORAGE", &v),
        }
    }
    if let Some(v) = read("INTELIOME_DB") {
        settings.storage.db_path = v;
    }

    // ── Logging / retry ─────────────────────────────────────────────
    if let Some(v) = read("INTELIOME_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("INTELIOME_MAX_RETRIES") {
        match parse_u32_range(&v, 0, 10) {
            Some(n) => settings.retry.max_retries = n,
            None => warn_invalid("INTELIOME_MAX_RETRIES", &v),
        }
    }
    if let Some(v) = read("INTELIOME_CATALOG") {
        settings.catalog_path = Some(v);
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
