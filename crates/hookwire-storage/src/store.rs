// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Store: transactional persistence plus coarse change notification.
//!
//! The Store is the only component permitted to touch persistent state.
//! Every write that mutates the `subscriptions` table emits a single
//! coalesced "changed" signal after commit; subscribers receive no deltas
//! and are expected to re-read whatever view they need.

use hookwire_core::{now_iso8601, HookwireError, SubscriptionStatus, VerificationResult};
use tokio::sync::broadcast;
use tracing::debug;

use crate::database::Database;
use crate::models::{Event, NewSubscription, QueuedEvent, Subscription};
use crate::queries;

/// Coarse change signal. Carries no payload by design; the notification
/// stream is best-effort and coalescable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange;

/// Handle to the broker's persistent state.
#[derive(Clone)]
pub struct Store {
    db: Database,
    changes: broadcast::Sender<StoreChange>,
}

impl Store {
    /// Open the store at the given database path, running migrations.
    pub async fn open(database_path: &str) -> Result<Self, HookwireError> {
        let db = Database::open(database_path).await?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self { db, changes })
    }

    /// Checkpoint and close the underlying database.
    pub async fn close(self) -> Result<(), HookwireError> {
        self.db.close().await
    }

    /// Subscribe to the coarse change stream.
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        // Receiver lag or absence is fine; the signal is best-effort.
        let _ = self.changes.send(StoreChange);
    }

    // --- Subscriptions ---

    /// Create a subscription. Assigns `id` when absent, forces
    /// `status = active`, `event_count = 0`, and stamps `created_at`.
    /// Empty filter expressions are normalized to `None`.
    pub async fn create_subscription(
        &self,
        fields: NewSubscription,
    ) -> Result<Subscription, HookwireError> {
        let sub = Subscription {
            id: fields
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            session_id: fields.session_id,
            webhook_url: fields.webhook_url,
            secret: normalize(fields.secret),
            signature_header: normalize(fields.signature_header),
            display_name: normalize(fields.display_name),
            service_tag: normalize(fields.service_tag),
            prompt: fields.prompt,
            gate_expr: normalize(fields.gate_expr),
            summary_expr: normalize(fields.summary_expr),
            one_shot: fields.one_shot,
            status: SubscriptionStatus::Active,
            created_at: now_iso8601(),
            event_count: 0,
        };
        queries::subscriptions::insert(&self.db, &sub).await?;
        debug!(id = sub.id.as_str(), session_id = sub.session_id.as_str(), "subscription created");
        self.notify_changed();
        Ok(sub)
    }

    pub async fn get_subscription(
        &self,
        id: &str,
    ) -> Result<Option<Subscription>, HookwireError> {
        queries::subscriptions::get(&self.db, id).await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, HookwireError> {
        queries::subscriptions::list(&self.db).await
    }

    pub async fn list_subscriptions_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Subscription>, HookwireError> {
        queries::subscriptions::list_by_session(&self.db, session_id).await
    }

    /// Full-record replace by `id`. Fails when the id does not exist.
    /// Empty filter expressions are normalized to `None`.
    pub async fn update_subscription(
        &self,
        mut sub: Subscription,
    ) -> Result<Subscription, HookwireError> {
        sub.secret = normalize(sub.secret);
        sub.signature_header = normalize(sub.signature_header);
        sub.gate_expr = normalize(sub.gate_expr);
        sub.summary_expr = normalize(sub.summary_expr);
        let updated = queries::subscriptions::update(&self.db, &sub).await?;
        if updated == 0 {
            return Err(HookwireError::Internal(format!(
                "update of missing subscription {}",
                sub.id
            )));
        }
        self.notify_changed();
        Ok(sub)
    }

    /// Idempotent delete; cascades events and queued entries.
    pub async fn delete_subscription(&self, id: &str) -> Result<(), HookwireError> {
        queries::subscriptions::delete(&self.db, id).await?;
        self.notify_changed();
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), HookwireError> {
        queries::subscriptions::set_status(&self.db, id, status).await?;
        self.notify_changed();
        Ok(())
    }

    pub async fn increment_event_count(&self, id: &str) -> Result<(), HookwireError> {
        queries::subscriptions::increment_event_count(&self.db, id).await?;
        self.notify_changed();
        Ok(())
    }

    // --- Events ---

    /// Append an event to the audit log.
    pub async fn log_event(
        &self,
        subscription_id: &str,
        payload: &str,
        result: VerificationResult,
        injected: bool,
    ) -> Result<Event, HookwireError> {
        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            subscription_id: subscription_id.to_string(),
            received_at: now_iso8601(),
            payload: payload.to_string(),
            verification_result: result,
            injected,
        };
        queries::events::insert(&self.db, &event).await?;
        Ok(event)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, HookwireError> {
        queries::events::get(&self.db, id).await
    }

    pub async fn list_events(
        &self,
        subscription_id: &str,
        limit: i64,
    ) -> Result<Vec<Event>, HookwireError> {
        queries::events::list_for_subscription(&self.db, subscription_id, limit).await
    }

    pub async fn list_uninjected_events(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Event>, HookwireError> {
        queries::events::list_uninjected(&self.db, subscription_id).await
    }

    /// Mark an event injected. No-op on repeat calls.
    pub async fn mark_event_injected(&self, id: &str) -> Result<(), HookwireError> {
        queries::events::mark_injected(&self.db, id).await
    }

    /// Prune events received before the cutoff timestamp.
    pub async fn prune_events_older_than(
        &self,
        cutoff: &str,
    ) -> Result<usize, HookwireError> {
        queries::events::prune_older_than(&self.db, cutoff).await
    }

    // --- Queued events ---

    /// Buffer a framed payload for redelivery when the session reappears.
    /// `event_id` names the event this delivery carries, so a successful
    /// drain can mark exactly that event injected.
    pub async fn enqueue(
        &self,
        subscription_id: &str,
        session_id: &str,
        event_id: &str,
        framed_payload: &str,
    ) -> Result<i64, HookwireError> {
        queries::queue::enqueue(
            &self.db,
            subscription_id,
            session_id,
            event_id,
            framed_payload,
            &now_iso8601(),
        )
        .await
    }

    /// Queued entries for one session, oldest first.
    pub async fn list_queued_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<QueuedEvent>, HookwireError> {
        queries::queue::list_for_session(&self.db, session_id).await
    }

    /// Remove one queued entry without touching counters. Idempotent.
    pub async fn dequeue(&self, id: i64) -> Result<(), HookwireError> {
        queries::queue::dequeue(&self.db, id).await
    }

    /// Complete a drained delivery: removes the queue entry, bumps
    /// `event_count`, and marks the delivered event injected, all in one
    /// transaction.
    pub async fn complete_drained_delivery(
        &self,
        queued_id: i64,
        subscription_id: &str,
        event_id: &str,
    ) -> Result<(), HookwireError> {
        queries::queue::complete_delivery(&self.db, queued_id, subscription_id, event_id)
            .await?;
        self.notify_changed();
        Ok(())
    }

    /// Per-session pending counts for startup recovery logging.
    pub async fn queued_counts_by_session(
        &self,
    ) -> Result<Vec<(String, i64)>, HookwireError> {
        queries::queue::pending_counts(&self.db).await
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Store::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn sample_fields(session_id: &str) -> NewSubscription {
        NewSubscription {
            session_id: session_id.to_string(),
            webhook_url: "https://example.test/webhook/abc".to_string(),
            secret: Some("shhh".to_string()),
            service_tag: Some("github".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (store, _dir) = open_store().await;

        let created = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        assert_eq!(created.status, SubscriptionStatus::Active);
        assert_eq!(created.event_count, 0);
        assert!(!created.id.is_empty());

        let fetched = store.get_subscription(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.session_id, "sess-1");
        assert_eq!(fetched.secret.as_deref(), Some("shhh"));
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[tokio::test]
    async fn create_honors_caller_supplied_id() {
        let (store, _dir) = open_store().await;
        let mut fields = sample_fields("sess-1");
        fields.id = Some("fixed-id".to_string());
        let created = store.create_subscription(fields).await.unwrap();
        assert_eq!(created.id, "fixed-id");
    }

    #[tokio::test]
    async fn empty_filter_expressions_normalize_to_none() {
        let (store, _dir) = open_store().await;
        let mut fields = sample_fields("sess-1");
        fields.gate_expr = Some("   ".to_string());
        fields.summary_expr = Some(String::new());
        let created = store.create_subscription(fields).await.unwrap();
        assert!(created.gate_expr.is_none());
        assert!(created.summary_expr.is_none());
    }

    #[tokio::test]
    async fn full_update_then_get_yields_updated_record() {
        let (store, _dir) = open_store().await;
        let mut sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        sub.display_name = Some("CI alerts".to_string());
        sub.gate_expr = Some(".action == \"opened\"".to_string());
        sub.status = SubscriptionStatus::Paused;
        let updated = store.update_subscription(sub.clone()).await.unwrap();

        let fetched = store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(fetched.display_name.as_deref(), Some("CI alerts"));
        assert_eq!(fetched.gate_expr, updated.gate_expr);
        assert_eq!(fetched.status, SubscriptionStatus::Paused);
    }

    #[tokio::test]
    async fn update_of_missing_id_fails() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        store.delete_subscription(&sub.id).await.unwrap();

        let result = store.update_subscription(sub).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        store.delete_subscription(&sub.id).await.unwrap();
        store.delete_subscription(&sub.id).await.unwrap();
        assert!(store.get_subscription(&sub.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_events_and_queue() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        let event = store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        store
            .enqueue(&sub.id, "sess-1", &event.id, "<webhook-event>framed</webhook-event>")
            .await
            .unwrap();

        store.delete_subscription(&sub.id).await.unwrap();

        assert!(store.get_event(&event.id).await.unwrap().is_none());
        assert!(store
            .list_queued_for_session("sess-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_by_session_filters() {
        let (store, _dir) = open_store().await;
        store
            .create_subscription(sample_fields("sess-a"))
            .await
            .unwrap();
        store
            .create_subscription(sample_fields("sess-a"))
            .await
            .unwrap();
        store
            .create_subscription(sample_fields("sess-b"))
            .await
            .unwrap();

        assert_eq!(store.list_subscriptions().await.unwrap().len(), 3);
        assert_eq!(
            store
                .list_subscriptions_by_session("sess-a")
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn mark_injected_is_idempotent() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        let event = store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
            .await
            .unwrap();

        store.mark_event_injected(&event.id).await.unwrap();
        store.mark_event_injected(&event.id).await.unwrap();

        let fetched = store.get_event(&event.id).await.unwrap().unwrap();
        assert!(fetched.injected);
    }

    #[tokio::test]
    async fn uninjected_listing_excludes_injected() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        let e1 = store
            .log_event(&sub.id, "{\"n\":1}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        let _e2 = store
            .log_event(&sub.id, "{\"n\":2}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        store.mark_event_injected(&e1.id).await.unwrap();

        let pending = store.list_uninjected_events(&sub.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, "{\"n\":2}");
    }

    #[tokio::test]
    async fn prune_removes_only_older_events() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, true)
            .await
            .unwrap();

        // Cutoff in the past: nothing pruned.
        let pruned = store
            .prune_events_older_than("2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(pruned, 0);

        // Cutoff in the future: everything pruned.
        let pruned = store
            .prune_events_older_than("2100-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(pruned, 1);
    }

    #[tokio::test]
    async fn queue_preserves_enqueue_order() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        for framed in ["first", "second", "third"] {
            let event = store
                .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
                .await
                .unwrap();
            store
                .enqueue(&sub.id, "sess-1", &event.id, framed)
                .await
                .unwrap();
        }

        let queued = store.list_queued_for_session("sess-1").await.unwrap();
        let payloads: Vec<&str> = queued.iter().map(|q| q.framed_payload.as_str()).collect();
        assert_eq!(payloads, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn dequeue_removes_entry_without_counters() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        let event = store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        let queued_id = store
            .enqueue(&sub.id, "sess-1", &event.id, "framed")
            .await
            .unwrap();

        store.dequeue(queued_id).await.unwrap();
        store.dequeue(queued_id).await.unwrap(); // idempotent

        assert!(store
            .list_queued_for_session("sess-1")
            .await
            .unwrap()
            .is_empty());
        let sub = store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(sub.event_count, 0, "dequeue must not bump the counter");
    }

    #[tokio::test]
    async fn complete_drained_delivery_removes_entry_and_bumps_count() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        let event = store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        let queued_id = store
            .enqueue(&sub.id, "sess-1", &event.id, "framed")
            .await
            .unwrap();

        store
            .complete_drained_delivery(queued_id, &sub.id, &event.id)
            .await
            .unwrap();

        assert!(store
            .list_queued_for_session("sess-1")
            .await
            .unwrap()
            .is_empty());
        let sub = store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(sub.event_count, 1);
        let event = store.get_event(&event.id).await.unwrap().unwrap();
        assert!(event.injected);
    }

    #[tokio::test]
    async fn drain_marks_the_delivered_event_not_an_older_rejected_one() {
        let (store, _dir) = open_store().await;
        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();

        // An older rejected delivery sits in the audit log with injected=0.
        let rejected = store
            .log_event(&sub.id, "{}", VerificationResult::Rejected, false)
            .await
            .unwrap();
        let accepted = store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, false)
            .await
            .unwrap();
        let queued_id = store
            .enqueue(&sub.id, "sess-1", &accepted.id, "framed")
            .await
            .unwrap();

        store
            .complete_drained_delivery(queued_id, &sub.id, &accepted.id)
            .await
            .unwrap();

        let accepted = store.get_event(&accepted.id).await.unwrap().unwrap();
        assert!(accepted.injected, "the drained event must be marked");
        let rejected = store.get_event(&rejected.id).await.unwrap().unwrap();
        assert!(
            !rejected.injected,
            "a rejected delivery was never sent and must stay uninjected"
        );
    }

    #[tokio::test]
    async fn change_signal_emitted_on_subscription_writes() {
        let (store, _dir) = open_store().await;
        let mut rx = store.subscribe_to_changes();

        let sub = store
            .create_subscription(sample_fields("sess-1"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreChange);

        store
            .set_status(&sub.id, SubscriptionStatus::Paused)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreChange);

        store.delete_subscription(&sub.id).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreChange);
    }

    #[tokio::test]
    async fn queued_counts_grouped_by_session() {
        let (store, _dir) = open_store().await;
        let a = store
            .create_subscription(sample_fields("sess-a"))
            .await
            .unwrap();
        let b = store
            .create_subscription(sample_fields("sess-b"))
            .await
            .unwrap();
        for (sub_id, session_id, framed) in
            [(&a.id, "sess-a", "x"), (&a.id, "sess-a", "y"), (&b.id, "sess-b", "z")]
        {
            let event = store
                .log_event(sub_id, "{}", VerificationResult::Accepted, false)
                .await
                .unwrap();
            store
                .enqueue(sub_id, session_id, &event.id, framed)
                .await
                .unwrap();
        }

        let counts = store.queued_counts_by_session().await.unwrap();
        assert_eq!(
            counts,
            vec![("sess-a".to_string(), 2), ("sess-b".to_string(), 1)]
        );
    }
}
