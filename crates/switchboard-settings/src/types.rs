//! Settings types.
//!
//! All structs use camelCase JSON keys and `#[serde(default)]`, so a
//! settings file only needs to name the values it changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_core::logging::LogFormat;

/// Top-level settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Deployment environment (affects logging only).
    pub environment: Environment,
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Logging overrides.
    pub logging: LoggingSettings,
}

impl SwitchboardSettings {
    /// Effective log level: explicit override, else the environment default.
    pub fn log_level(&self) -> LogLevel {
        self.logging
            .level
            .clone()
            .unwrap_or_else(|| self.environment.default_log_level())
    }

    /// Log output format for the environment.
    pub fn log_format(&self) -> LogFormat {
        self.environment.log_format()
    }
}

/// Deployment environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Verbose, human-readable logs.
    #[default]
    Development,
    /// Info-level JSON logs.
    Production,
}

impl Environment {
    /// Parse an environment name (case-insensitive, `dev`/`prod` accepted).
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Log level used when none is configured.
    pub fn default_log_level(self) -> LogLevel {
        match self {
            Self::Development => LogLevel::Debug,
            Self::Production => LogLevel::Info,
        }
    }

    /// Log format for this environment.
    pub fn log_format(self) -> LogFormat {
        match self {
            Self::Development => LogFormat::Compact,
            Self::Production => LogFormat::Json,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

/// Listener and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port, shared by HTTP endpoints and the WebSocket upgrade.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before drops.
    pub send_queue_capacity: usize,
    /// Commands buffered in front of the relay hub.
    pub command_queue_capacity: usize,
    /// Interval between server Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_connections: 10_000,
            send_queue_capacity: 256,
            command_queue_capacity: 4096,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Log level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level.
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Parse a level name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to a tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Explicit level; when unset the environment decides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}
