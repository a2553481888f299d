// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The webhook processing state machine.
//!
//! One inbound delivery moves through lookup, signature verification, the
//! gate filter, persistence, summarization, framing, and delivery. A
//! failed delivery is never surfaced to the sender: the framed payload is
//! buffered and redelivered when the target session next appears
//! (queue-and-drain; the pipeline deliberately does not retry inline).

pub mod framing;
pub mod verify;

use std::collections::HashMap;

use hookwire_core::{HookwireError, SubscriptionStatus, VerificationResult};
use hookwire_filter::{FilterOutcome, JqEngine};
use hookwire_session::Injector;
use hookwire_storage::{Store, Subscription};
use tracing::{debug, info, warn};

use crate::framing::{frame_message, truncate_utf8, FrameInput};
use crate::verify::{verify_signature, DEFAULT_SIGNATURE_HEADER};

/// Summary fallback sizes, in bytes of the raw payload.
const SUMMARY_DEFAULT_TRUNCATION: usize = 2000;
const SUMMARY_ERROR_TRUNCATION: usize = 500;

/// Terminal outcome of one webhook delivery, as seen by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The event is the broker's problem now (delivered, queued, or
    /// intentionally gate-dropped).
    Accepted,
    /// The sender did something wrong; the reason is returned verbatim.
    Rejected(RejectReason),
    /// No subscription with that id.
    NotFound,
}

/// Reasons surfaced in the 403 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Paused,
    MissingSignature,
    InvalidSignature,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::MissingSignature => "missing_signature",
            Self::InvalidSignature => "invalid_signature",
        }
    }
}

/// Applies the full ingest flow to webhook requests and drains queued
/// deliveries when sessions reappear.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    injector: Injector,
    filter: JqEngine,
}

impl Pipeline {
    pub fn new(store: Store, injector: Injector, filter: JqEngine) -> Self {
        Self {
            store,
            injector,
            filter,
        }
    }

    /// Process one webhook request.
    ///
    /// `headers` carries lowercased header names. The body is treated as
    /// opaque bytes for the signature check and as (lossy) UTF-8 text for
    /// storage and filtering.
    pub async fn handle_webhook(
        &self,
        subscription_id: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<PipelineOutcome, HookwireError> {
        // LOOKUP
        let Some(sub) = self.store.get_subscription(subscription_id).await? else {
            return Ok(PipelineOutcome::NotFound);
        };
        if sub.status == SubscriptionStatus::Paused {
            debug!(subscription_id, "delivery to paused subscription rejected");
            return Ok(PipelineOutcome::Rejected(RejectReason::Paused));
        }

        let payload_text = String::from_utf8_lossy(body).into_owned();

        // VERIFY
        if let Some(secret) = sub.secret.as_deref() {
            let header_name = sub
                .signature_header
                .as_deref()
                .unwrap_or(DEFAULT_SIGNATURE_HEADER)
                .to_ascii_lowercase();
            match headers.get(&header_name) {
                None => {
                    self.store
                        .log_event(&sub.id, &payload_text, VerificationResult::Rejected, false)
                        .await?;
                    info!(subscription_id, header = header_name.as_str(), "signature header missing");
                    return Ok(PipelineOutcome::Rejected(RejectReason::MissingSignature));
                }
                Some(value) => {
                    if !verify_signature(secret, body, value) {
                        self.store
                            .log_event(&sub.id, &payload_text, VerificationResult::Rejected, false)
                            .await?;
                        info!(subscription_id, "signature mismatch");
                        return Ok(PipelineOutcome::Rejected(RejectReason::InvalidSignature));
                    }
                }
            }
        }

        // GATE: a dropped or failing gate is a silent accept with no trace.
        if let Some(gate_expr) = sub.gate_expr.as_deref() {
            match self.filter.evaluate(gate_expr, body).await {
                Ok(FilterOutcome::Produced(_)) => {}
                Ok(FilterOutcome::Dropped) => {
                    debug!(subscription_id, "event dropped by gate filter");
                    return Ok(PipelineOutcome::Accepted);
                }
                Err(e) => {
                    warn!(subscription_id, error = %e, "gate filter failed; dropping event");
                    return Ok(PipelineOutcome::Accepted);
                }
            }
        }

        // PERSIST: the event id is allocated here.
        let event = self
            .store
            .log_event(&sub.id, &payload_text, VerificationResult::Accepted, false)
            .await?;

        // SUMMARIZE
        let summary = self.summarize(&sub, body, &payload_text).await;

        // FRAME
        let framed = frame_message(&FrameInput {
            subscription_id: &sub.id,
            event_id: &event.id,
            service_tag: sub.service_tag.as_deref(),
            prompt: sub.prompt.as_deref(),
            summary_text: &summary,
        });

        // DELIVER: failures fall back to the queue, never to the sender.
        match self.injector.inject(&sub.session_id, &framed).await {
            Ok(true) => {
                self.store.mark_event_injected(&event.id).await?;
                self.store.increment_event_count(&sub.id).await?;
                info!(subscription_id, event_id = event.id.as_str(), "event injected");
                self.finish_one_shot(&sub).await?;
            }
            Ok(false) => {
                self.store
                    .enqueue(&sub.id, &sub.session_id, &event.id, &framed)
                    .await?;
                info!(
                    subscription_id,
                    session_id = sub.session_id.as_str(),
                    "session offline; event queued"
                );
            }
            Err(e) => {
                self.store
                    .enqueue(&sub.id, &sub.session_id, &event.id, &framed)
                    .await?;
                warn!(subscription_id, error = %e, "injection failed; event queued");
            }
        }

        Ok(PipelineOutcome::Accepted)
    }

    /// Deliver a session's queued events in enqueue order.
    ///
    /// Each entry gets a single `inject` call; the first failure stops the
    /// drain so ordering is preserved for the next appearance. Returns the
    /// number of entries delivered.
    pub async fn drain_session(&self, session_id: &str) -> Result<usize, HookwireError> {
        let queued = self.store.list_queued_for_session(session_id).await?;
        if queued.is_empty() {
            return Ok(0);
        }
        info!(session_id, pending = queued.len(), "draining queued events");

        let mut drained = 0;
        for entry in queued {
            match self
                .injector
                .inject(session_id, &entry.framed_payload)
                .await
            {
                Ok(true) => {
                    self.store
                        .complete_drained_delivery(
                            entry.id,
                            &entry.subscription_id,
                            &entry.event_id,
                        )
                        .await?;
                    drained += 1;
                    if let Some(sub) =
                        self.store.get_subscription(&entry.subscription_id).await?
                    {
                        self.finish_one_shot(&sub).await?;
                    }
                }
                Ok(false) => {
                    debug!(session_id, "session vanished mid-drain; stopping");
                    break;
                }
                Err(e) => {
                    warn!(session_id, error = %e, "drain delivery failed; stopping");
                    break;
                }
            }
        }
        Ok(drained)
    }

    async fn summarize(
        &self,
        sub: &Subscription,
        body: &[u8],
        payload_text: &str,
    ) -> String {
        match sub.summary_expr.as_deref() {
            None => truncate_utf8(payload_text, SUMMARY_DEFAULT_TRUNCATION).to_string(),
            Some(expr) => match self.filter.evaluate(expr, body).await {
                Ok(FilterOutcome::Produced(produced)) => produced,
                Ok(FilterOutcome::Dropped) => {
                    debug!(subscription_id = sub.id.as_str(), "summary filter dropped; truncating");
                    truncate_utf8(payload_text, SUMMARY_ERROR_TRUNCATION).to_string()
                }
                Err(e) => {
                    warn!(subscription_id = sub.id.as_str(), error = %e, "summary filter failed; truncating");
                    truncate_utf8(payload_text, SUMMARY_ERROR_TRUNCATION).to_string()
                }
            },
        }
    }

    /// Enforce `one_shot`: the subscription is deleted after its first
    /// successful delivery, cascading its events and queued entries.
    async fn finish_one_shot(&self, sub: &Subscription) -> Result<(), HookwireError> {
        if sub.one_shot {
            info!(subscription_id = sub.id.as_str(), "one-shot subscription retired");
            self.store.delete_subscription(&sub.id).await?;
        }
        Ok(())
    }
}
