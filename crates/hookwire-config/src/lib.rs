// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the hookwire broker.
//!
//! Layered TOML + environment loading via Figment, typed model structs,
//! and post-deserialization validation.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::BrokerConfig;
pub use validation::validate_config;
