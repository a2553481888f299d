// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! hookwire - a single-host webhook broker for local agent sessions.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// hookwire - receive webhooks, filter them, inject them into local agent sessions.
#[derive(Parser, Debug)]
#[command(name = "hookwire", version, about, long_about = None)]
struct Cli {
    /// Path to an explicit config file (otherwise the XDG hierarchy is used).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the broker.
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve => match hookwire::serve::run_serve(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Commands::CheckConfig => match hookwire_config::validate_config(&config) {
            Ok(()) => {
                println!("configuration ok");
                ExitCode::SUCCESS
            }
            Err(errors) => {
                for error in errors {
                    eprintln!("error: {error}");
                }
                ExitCode::FAILURE
            }
        },
    }
}

fn load(cli: &Cli) -> Result<hookwire_config::BrokerConfig, hookwire_core::HookwireError> {
    let loaded = match &cli.config {
        Some(path) => hookwire_config::load_config_from_path(path),
        None => hookwire_config::load_config(),
    };
    loaded.map_err(|e| hookwire_core::HookwireError::Config(e.to_string()))
}
