//! # switchboard-settings
//!
//! Configuration for the Switchboard relay, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`SwitchboardSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `SWITCHBOARD_*` overrides (highest priority)
//!
//! The binary applies its CLI flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, CONFIG_PATH_ENV};
pub use types::{Environment, LogLevel, LoggingSettings, ServerSettings, SwitchboardSettings};
