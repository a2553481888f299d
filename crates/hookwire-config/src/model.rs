// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the hookwire broker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level hookwire configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Broker identity and logging settings.
    #[serde(default)]
    pub broker: BrokerSection,

    /// Ingress HTTP server settings.
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local session discovery settings.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Per-IP rate limiting settings.
    #[serde(default)]
    pub ratelimit: RateLimitConfig,

    /// jq filter evaluation settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Tunnel subprocess settings.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Event log retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Broker identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    /// Name reported by the health endpoint.
    #[serde(default = "default_broker_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Heap size in MiB above which the memory monitor logs a warning.
    #[serde(default = "default_memory_warn_mb")]
    pub memory_warn_mb: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            name: default_broker_name(),
            log_level: default_log_level(),
            memory_warn_mb: default_memory_warn_mb(),
        }
    }
}

fn default_broker_name() -> String {
    "hookwire".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_memory_warn_mb() -> u64 {
    512
}

/// Ingress HTTP server configuration.
///
/// The server always binds to loopback; only the port is configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// Port to bind on 127.0.0.1.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_port() -> u16 {
    7842
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    support_dir()
        .join("hookwire.db")
        .to_string_lossy()
        .into_owned()
}

/// Local session discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    /// Directory watched for `{session_id}.sock` files.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
        }
    }
}

fn default_socket_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hookwire/sessions")
        .to_string_lossy()
        .into_owned()
}

/// Per-IP fixed-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per window per client IP.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window duration in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

/// jq filter evaluation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// jq binary name or path.
    #[serde(default = "default_jq_bin")]
    pub jq_bin: String,

    /// Per-evaluation timeout in milliseconds.
    #[serde(default = "default_filter_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            jq_bin: default_jq_bin(),
            timeout_ms: default_filter_timeout_ms(),
        }
    }
}

fn default_jq_bin() -> String {
    "jq".to_string()
}

fn default_filter_timeout_ms() -> u64 {
    2000
}

/// Tunnel subprocess configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    /// Path to the prepared cloudflared config file (named mode).
    #[serde(default = "default_tunnel_config_path")]
    pub config_path: String,

    /// Application-support directory holding `bin/cloudflared` and state.
    #[serde(default = "default_support_dir")]
    pub support_dir: String,

    /// Health-check interval in seconds.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            config_path: default_tunnel_config_path(),
            support_dir: default_support_dir(),
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

fn default_tunnel_config_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/cloudflared/config.yml")
        .to_string_lossy()
        .into_owned()
}

fn default_support_dir() -> String {
    support_dir().to_string_lossy().into_owned()
}

fn default_health_interval_secs() -> u64 {
    30
}

/// Event log retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Events older than this many days are pruned. `0` disables the sweep.
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn support_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hookwire")
}
