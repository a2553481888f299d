// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the hookwire webhook broker.
//!
//! Provides the workspace-wide error type and the small set of domain
//! enums shared between the storage, pipeline, and control-plane crates.

pub mod error;
pub mod types;

pub use error::{HookwireError, InjectErrorKind};
pub use types::{now_iso8601, SubscriptionStatus, VerificationResult};
