// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! hookwire - a single-host webhook broker for local agent sessions.
//!
//! Library surface of the binary crate: broker assembly, shutdown
//! coordination, and the file-backed secret store. The `hookwire` binary
//! and the end-to-end tests both build brokers through [`app::Broker`].

pub mod app;
pub mod secrets;
pub mod serve;
pub mod shutdown;
