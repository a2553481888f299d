// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queued-event buffer operations for offline-session redelivery.

use hookwire_core::HookwireError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::QueuedEvent;

const COLUMNS: &str =
    "id, subscription_id, session_id, event_id, framed_payload, enqueued_at";

fn row_to_queued(row: &Row<'_>) -> rusqlite::Result<QueuedEvent> {
    Ok(QueuedEvent {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        session_id: row.get(2)?,
        event_id: row.get(3)?,
        framed_payload: row.get(4)?,
        enqueued_at: row.get(5)?,
    })
}

/// Buffer a framed payload for later delivery. Returns the entry id.
pub async fn enqueue(
    db: &Database,
    subscription_id: &str,
    session_id: &str,
    event_id: &str,
    framed_payload: &str,
    enqueued_at: &str,
) -> Result<i64, HookwireError> {
    let subscription_id = subscription_id.to_string();
    let session_id = session_id.to_string();
    let event_id = event_id.to_string();
    let framed_payload = framed_payload.to_string();
    let enqueued_at = enqueued_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queued_events
                 (subscription_id, session_id, event_id, framed_payload, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subscription_id,
                    session_id,
                    event_id,
                    framed_payload,
                    enqueued_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// List queued entries for one session in enqueue order (oldest first).
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<QueuedEvent>, HookwireError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM queued_events
                 WHERE session_id = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map(params![session_id], row_to_queued)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove one queued entry. Idempotent.
pub async fn dequeue(db: &Database, id: i64) -> Result<(), HookwireError> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM queued_events WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count queued entries per session, for startup recovery logging.
pub async fn pending_counts(db: &Database) -> Result<Vec<(String, i64)>, HookwireError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, COUNT(*) FROM queued_events
                 GROUP BY session_id ORDER BY session_id",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Complete a drained delivery in a single transaction: remove the queue
/// entry, bump the owning subscription's delivery counter, and mark the
/// delivered event injected. The event update no-ops if the retention
/// sweep pruned the event while it was queued.
pub async fn complete_delivery(
    db: &Database,
    queued_id: i64,
    subscription_id: &str,
    event_id: &str,
) -> Result<(), HookwireError> {
    let subscription_id = subscription_id.to_string();
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM queued_events WHERE id = ?1",
                params![queued_id],
            )?;
            tx.execute(
                "UPDATE subscriptions SET event_count = event_count + 1 WHERE id = ?1",
                params![subscription_id],
            )?;
            tx.execute(
                "UPDATE events SET injected = 1 WHERE id = ?1 AND injected = 0",
                params![event_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
