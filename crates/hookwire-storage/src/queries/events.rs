// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event audit-log operations.

use hookwire_core::{HookwireError, VerificationResult};
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::Event;

const COLUMNS: &str =
    "id, subscription_id, received_at, payload, verification_result, injected";

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let result: String = row.get(4)?;
    Ok(Event {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        received_at: row.get(2)?,
        payload: row.get(3)?,
        verification_result: result.parse::<VerificationResult>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        injected: row.get(5)?,
    })
}

/// Insert a fully-populated event row.
pub async fn insert(db: &Database, event: &Event) -> Result<(), HookwireError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO events
                 (id, subscription_id, received_at, payload, verification_result, injected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id,
                    event.subscription_id,
                    event.received_at,
                    event.payload,
                    event.verification_result.to_string(),
                    event.injected,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one event by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Event>, HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM events WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_event) {
                Ok(event) => Ok(Some(event)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List events for one subscription, newest first, up to `limit`.
pub async fn list_for_subscription(
    db: &Database,
    subscription_id: &str,
    limit: i64,
) -> Result<Vec<Event>, HookwireError> {
    let subscription_id = subscription_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM events
                 WHERE subscription_id = ?1
                 ORDER BY received_at DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![subscription_id, limit], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// List events for one subscription that have not reached a session yet,
/// oldest first.
pub async fn list_uninjected(
    db: &Database,
    subscription_id: &str,
) -> Result<Vec<Event>, HookwireError> {
    let subscription_id = subscription_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM events
                 WHERE subscription_id = ?1 AND injected = 0
                 ORDER BY received_at ASC"
            ))?;
            let rows = stmt
                .query_map(params![subscription_id], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an event as injected. A no-op when the event is already marked
/// or does not exist.
pub async fn mark_injected(db: &Database, id: &str) -> Result<(), HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE events SET injected = 1 WHERE id = ?1 AND injected = 0",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete events received before `cutoff`. Returns the number pruned.
pub async fn prune_older_than(db: &Database, cutoff: &str) -> Result<usize, HookwireError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM events WHERE received_at < ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}
