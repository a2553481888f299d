// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects all violations instead of failing fast.

use crate::model::BrokerConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err` with every collected
/// violation message.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }

    if config.sessions.socket_dir.trim().is_empty() {
        errors.push("sessions.socket_dir must not be empty".to_string());
    }

    if config.ratelimit.max_requests == 0 {
        errors.push("ratelimit.max_requests must be at least 1".to_string());
    }

    if config.ratelimit.window_secs == 0 {
        errors.push("ratelimit.window_secs must be at least 1".to_string());
    }

    if config.filter.jq_bin.trim().is_empty() {
        errors.push("filter.jq_bin must not be empty".to_string());
    }

    if config.filter.timeout_ms == 0 {
        errors.push("filter.timeout_ms must be at least 1".to_string());
    }

    if config.ingress.max_body_bytes == 0 {
        errors.push("ingress.max_body_bytes must be at least 1".to_string());
    }

    if config.tunnel.health_interval_secs == 0 {
        errors.push("tunnel.health_interval_secs must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BrokerConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_window_collects_error() {
        let mut config = BrokerConfig::default();
        config.ratelimit.window_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("window_secs"));
    }

    #[test]
    fn multiple_violations_all_collected() {
        let mut config = BrokerConfig::default();
        config.storage.database_path = "  ".to_string();
        config.ratelimit.max_requests = 0;
        config.filter.jq_bin = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
