// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription table operations.

use hookwire_core::{HookwireError, SubscriptionStatus};
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::Subscription;

const COLUMNS: &str = "id, session_id, webhook_url, secret, signature_header, \
     display_name, service_tag, prompt, gate_expr, summary_expr, one_shot, \
     status, created_at, event_count";

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let status: String = row.get(11)?;
    Ok(Subscription {
        id: row.get(0)?,
        session_id: row.get(1)?,
        webhook_url: row.get(2)?,
        secret: row.get(3)?,
        signature_header: row.get(4)?,
        display_name: row.get(5)?,
        service_tag: row.get(6)?,
        prompt: row.get(7)?,
        gate_expr: row.get(8)?,
        summary_expr: row.get(9)?,
        one_shot: row.get(10)?,
        status: status.parse::<SubscriptionStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                11,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        created_at: row.get(12)?,
        event_count: row.get(13)?,
    })
}

/// Insert a fully-populated subscription record.
pub async fn insert(db: &Database, sub: &Subscription) -> Result<(), HookwireError> {
    let sub = sub.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO subscriptions
                 (id, session_id, webhook_url, secret, signature_header,
                  display_name, service_tag, prompt, gate_expr, summary_expr,
                  one_shot, status, created_at, event_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    sub.id,
                    sub.session_id,
                    sub.webhook_url,
                    sub.secret,
                    sub.signature_header,
                    sub.display_name,
                    sub.service_tag,
                    sub.prompt,
                    sub.gate_expr,
                    sub.summary_expr,
                    sub.one_shot,
                    sub.status.to_string(),
                    sub.created_at,
                    sub.event_count,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one subscription by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Subscription>, HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM subscriptions WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_subscription) {
                Ok(sub) => Ok(Some(sub)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List all subscriptions, newest first.
pub async fn list(db: &Database) -> Result<Vec<Subscription>, HookwireError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM subscriptions ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], row_to_subscription)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// List subscriptions targeting one session, newest first.
pub async fn list_by_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<Subscription>, HookwireError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM subscriptions
                 WHERE session_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![session_id], row_to_subscription)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Full-record replace by id. Returns the number of rows updated (0 when
/// the id does not exist).
pub async fn update(db: &Database, sub: &Subscription) -> Result<usize, HookwireError> {
    let sub = sub.clone();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE subscriptions SET
                 session_id = ?2, webhook_url = ?3, secret = ?4,
                 signature_header = ?5, display_name = ?6, service_tag = ?7,
                 prompt = ?8, gate_expr = ?9, summary_expr = ?10,
                 one_shot = ?11, status = ?12, created_at = ?13,
                 event_count = ?14
                 WHERE id = ?1",
                params![
                    sub.id,
                    sub.session_id,
                    sub.webhook_url,
                    sub.secret,
                    sub.signature_header,
                    sub.display_name,
                    sub.service_tag,
                    sub.prompt,
                    sub.gate_expr,
                    sub.summary_expr,
                    sub.one_shot,
                    sub.status.to_string(),
                    sub.created_at,
                    sub.event_count,
                ],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a subscription, cascading its events and queued entries.
/// Idempotent; deleting a missing id is not an error.
pub async fn delete(db: &Database, id: &str) -> Result<(), HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set the lifecycle status of a subscription.
pub async fn set_status(
    db: &Database,
    id: &str,
    status: SubscriptionStatus,
) -> Result<(), HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE subscriptions SET status = ?2 WHERE id = ?1",
                params![id, status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the delivery counter by one.
pub async fn increment_event_count(db: &Database, id: &str) -> Result<(), HookwireError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE subscriptions SET event_count = event_count + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
