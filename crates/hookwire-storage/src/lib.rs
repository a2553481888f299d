// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable state for the hookwire broker: subscriptions, the event audit
//! log, and the queued-event retry buffer, backed by a single SQLite file.
//!
//! The [`Store`] facade is the only owner of persistent state. Other crates
//! hold cloned handles and receive coarse change signals through
//! [`Store::subscribe_to_changes`].

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use database::Database;
pub use models::{Event, NewSubscription, QueuedEvent, Subscription};
pub use store::{Store, StoreChange};
