// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the hookwire configuration system.

use hookwire_config::{load_config_from_str, validate_config, BrokerConfig};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_broker_config() {
    let toml = r#"
[broker]
name = "test-broker"
log_level = "debug"
memory_warn_mb = 256

[ingress]
port = 9000
max_body_bytes = 1048576

[storage]
database_path = "/tmp/test.db"

[sessions]
socket_dir = "/tmp/sessions"

[ratelimit]
max_requests = 3
window_secs = 10

[filter]
jq_bin = "/usr/bin/jq"
timeout_ms = 500

[tunnel]
config_path = "/tmp/config.yml"
support_dir = "/tmp/support"
health_interval_secs = 5

[retention]
days = 7
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.broker.name, "test-broker");
    assert_eq!(config.broker.log_level, "debug");
    assert_eq!(config.broker.memory_warn_mb, 256);
    assert_eq!(config.ingress.port, 9000);
    assert_eq!(config.ingress.max_body_bytes, 1_048_576);
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert_eq!(config.sessions.socket_dir, "/tmp/sessions");
    assert_eq!(config.ratelimit.max_requests, 3);
    assert_eq!(config.ratelimit.window_secs, 10);
    assert_eq!(config.filter.jq_bin, "/usr/bin/jq");
    assert_eq!(config.filter.timeout_ms, 500);
    assert_eq!(config.tunnel.config_path, "/tmp/config.yml");
    assert_eq!(config.tunnel.health_interval_secs, 5);
    assert_eq!(config.retention.days, 7);
}

/// Empty TOML produces the compiled defaults.
#[test]
fn empty_toml_produces_defaults() {
    let config = load_config_from_str("").expect("empty TOML should produce defaults");
    assert_eq!(config.broker.name, "hookwire");
    assert_eq!(config.broker.memory_warn_mb, 512);
    assert_eq!(config.ingress.port, 7842);
    assert_eq!(config.ingress.max_body_bytes, 10 * 1024 * 1024);
    assert_eq!(config.ratelimit.max_requests, 100);
    assert_eq!(config.ratelimit.window_secs, 60);
    assert_eq!(config.filter.jq_bin, "jq");
    assert_eq!(config.filter.timeout_ms, 2000);
    assert_eq!(config.tunnel.health_interval_secs, 30);
    assert_eq!(config.retention.days, 30);
    assert!(config.tunnel.config_path.ends_with(".config/cloudflared/config.yml"));
}

/// Partial sections merge over defaults rather than replacing them.
#[test]
fn partial_section_merges_over_defaults() {
    let toml = r#"
[ingress]
port = 8080
"#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.ingress.port, 8080);
    // Unspecified field in the same section keeps its default.
    assert_eq!(config.ingress.max_body_bytes, 10 * 1024 * 1024);
}

/// Unknown fields are rejected at deserialization time.
#[test]
fn unknown_field_is_rejected() {
    let toml = r#"
[ingress]
port = 8080
bind_host = "0.0.0.0"
"#;
    let result = load_config_from_str(toml);
    assert!(result.is_err(), "unknown field should be rejected");
}

/// Unknown top-level sections are rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[clustering]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Defaults pass semantic validation.
#[test]
fn defaults_pass_validation() {
    let config = BrokerConfig::default();
    assert!(validate_config(&config).is_ok());
}

/// Semantically invalid values loaded from TOML are caught by validation.
#[test]
fn loaded_config_with_zero_cap_fails_validation() {
    let toml = r#"
[ratelimit]
max_requests = 0
"#;
    let config = load_config_from_str(toml).unwrap();
    let errors = validate_config(&config).unwrap_err();
    assert!(errors.iter().any(|e| e.contains("max_requests")));
}
