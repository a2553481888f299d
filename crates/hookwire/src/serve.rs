// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `hookwire serve` command implementation.
//!
//! Validates the configuration, installs signal handlers, assembles the
//! broker, and blocks until shutdown completes.

use hookwire_config::BrokerConfig;
use hookwire_core::HookwireError;
use tracing::info;

use crate::app::Broker;
use crate::shutdown;

/// Run the broker until SIGTERM/SIGINT.
pub async fn run_serve(config: BrokerConfig) -> Result<(), HookwireError> {
    init_tracing(&config.broker.log_level);

    if let Err(errors) = hookwire_config::validate_config(&config) {
        return Err(HookwireError::Config(errors.join("; ")));
    }

    info!(name = config.broker.name.as_str(), "starting hookwire serve");

    let cancel = shutdown::install_signal_handler();
    let broker = Broker::start(config, cancel).await?;
    broker.run_to_completion().await?;

    info!("hookwire serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hookwire={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
