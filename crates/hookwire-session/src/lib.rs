// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local session discovery and message injection.
//!
//! Sessions expose themselves as Unix-domain socket servers named
//! `{session_id}.sock` under a shared directory. [`SessionWatch`] maintains
//! the set of live sessions (socket present AND accepting connections);
//! [`Injector`] delivers a single framed JSON line to one of them.

pub mod injector;
pub mod watcher;

pub use injector::{frame_line, Injector};
pub use watcher::{SessionEvent, SessionWatch};
