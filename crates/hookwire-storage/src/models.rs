// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! These types represent the rows stored in the SQLite database. The
//! `subscriptions` table is the primary entity; `events` is the audit log
//! and `queued_events` the retry buffer, both cascade-deleted with their
//! owning subscription.

use hookwire_core::{SubscriptionStatus, VerificationResult};
use serde::{Deserialize, Serialize};

/// A configured webhook recipient binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique subscription identifier.
    pub id: String,
    /// Target local session. Not unique; one session may hold many subscriptions.
    pub session_id: String,
    /// Externally-reachable delivery URL, derived at creation time.
    pub webhook_url: String,
    /// HMAC verification key material. `None` disables verification.
    pub secret: Option<String>,
    /// HTTP header carrying the signature. Defaults to `X-Hub-Signature-256`.
    pub signature_header: Option<String>,
    /// Advisory display name.
    pub display_name: Option<String>,
    /// Advisory service tag (e.g. "github", "stripe").
    pub service_tag: Option<String>,
    /// Free text embedded in the framed message.
    pub prompt: Option<String>,
    /// jq expression deciding whether an event is processed at all.
    pub gate_expr: Option<String>,
    /// jq expression producing the body inside `<payload>`.
    pub summary_expr: Option<String>,
    /// Delete the subscription after its first successful delivery.
    pub one_shot: bool,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Monotonic count of successful deliveries. Never decreases.
    pub event_count: i64,
}

/// Caller-supplied fields for subscription creation.
///
/// The store assigns `id` (when absent), `status`, `created_at`, and
/// `event_count`.
#[derive(Debug, Clone, Default)]
pub struct NewSubscription {
    pub id: Option<String>,
    pub session_id: String,
    pub webhook_url: String,
    pub secret: Option<String>,
    pub signature_header: Option<String>,
    pub display_name: Option<String>,
    pub service_tag: Option<String>,
    pub prompt: Option<String>,
    pub gate_expr: Option<String>,
    pub summary_expr: Option<String>,
    pub one_shot: bool,
}

/// One audit-log entry for a delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier (exposed in the framed message).
    pub id: String,
    /// Owning subscription; events are cascade-deleted with it.
    pub subscription_id: String,
    /// ISO 8601 receipt timestamp.
    pub received_at: String,
    /// Raw request body as stored text.
    pub payload: String,
    /// Signature verification outcome.
    pub verification_result: VerificationResult,
    /// Whether the framed message reached a session. Mutable false -> true once.
    pub injected: bool,
}

/// A framed message awaiting redelivery to an offline session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Auto-increment queue entry ID; drain order is ascending id.
    pub id: i64,
    /// Owning subscription; queued entries are cascade-deleted with it.
    pub subscription_id: String,
    /// Target session captured at enqueue time. Later subscription edits do
    /// not affect an in-flight queued delivery.
    pub session_id: String,
    /// The event this delivery carries; marked injected when the drain
    /// succeeds. A soft reference: the retention sweep may prune the event
    /// while the entry is still queued.
    pub event_id: String,
    /// The already-framed bytes to deliver.
    pub framed_payload: String,
    /// ISO 8601 enqueue timestamp.
    pub enqueued_at: String,
}
