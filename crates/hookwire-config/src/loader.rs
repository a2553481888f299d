// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./hookwire.toml` > `~/.config/hookwire/hookwire.toml`
//! > `/etc/hookwire/hookwire.toml` with environment variable overrides via the
//! `HOOKWIRE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BrokerConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/hookwire/hookwire.toml` (system-wide)
/// 3. `~/.config/hookwire/hookwire.toml` (user XDG config)
/// 4. `./hookwire.toml` (local directory)
/// 5. `HOOKWIRE_*` environment variables
pub fn load_config() -> Result<BrokerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BrokerConfig::default()))
        .merge(Toml::file("/etc/hookwire/hookwire.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("hookwire/hookwire.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("hookwire.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config file specification.
pub fn load_config_from_str(toml_content: &str) -> Result<BrokerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BrokerConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BrokerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BrokerConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `HOOKWIRE_STORAGE_DATABASE_PATH` must
/// map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("HOOKWIRE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("broker_", "broker.", 1)
            .replacen("ingress_", "ingress.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("sessions_", "sessions.", 1)
            .replacen("ratelimit_", "ratelimit.", 1)
            .replacen("filter_", "filter.", 1)
            .replacen("tunnel_", "tunnel.", 1)
            .replacen("retention_", "retention.", 1);
        mapped.into()
    })
}
