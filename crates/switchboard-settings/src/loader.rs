//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SwitchboardSettings::default()`]
//! 2. If a settings file is given, deep-merge its values over defaults
//! 3. Apply `SWITCHBOARD_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{Environment, LogLevel, SwitchboardSettings};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "SWITCHBOARD_CONFIG";

/// Load settings from an optional JSON file, then apply process env overrides.
///
/// A missing `path` means defaults plus environment. A path that does not
/// exist is an error: an explicitly named file is expected to be there.
pub fn load_settings(path: Option<&Path>) -> Result<SwitchboardSettings> {
    let defaults = serde_json::to_value(SwitchboardSettings::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => {
            debug!("no settings file, using defaults");
            defaults
        }
    };

    let mut settings: SwitchboardSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
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

/// Apply environment overrides read through `lookup`.
///
/// `lookup` is `std::env::var` in production and a map in tests. Values that
/// fail to parse are ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut SwitchboardSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("SWITCHBOARD_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("SWITCHBOARD_PORT") {
        match parse_u16_range(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "SWITCHBOARD_PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = read("SWITCHBOARD_ENV") {
        match Environment::parse(&v) {
            Some(env) => settings.environment = env,
            None => warn!(key = "SWITCHBOARD_ENV", value = %v, "unknown environment, ignoring"),
        }
    }
    if let Some(v) = read("SWITCHBOARD_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = Some(level),
            None => warn!(key = "SWITCHBOARD_LOG_LEVEL", value = %v, "unknown log level, ignoring"),
        }
    }
    if let Some(v) = read("SWITCHBOARD_MAX_CONNECTIONS") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.max_connections = n,
            None => warn!(key = "SWITCHBOARD_MAX_CONNECTIONS", value = %v, "invalid connection limit, ignoring"),
        }
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
