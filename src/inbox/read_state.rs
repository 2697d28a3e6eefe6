//! Per-side read markers and unread counts.
//!
//! A message is unread for a side when the other side wrote it and its
//! `created_at` is strictly after the side's marker (or the marker is unset).
//! Markers only move forward.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::trace;

use super::model::Side;
use super::InboxError;
use crate::clock::format_ts;

/// Bound on ids per `IN (..)` list, below SQLite's variable limit.
const IN_CHUNK: usize = 500;

/// SQL list of the roles that count as unread for `side`.
fn foreign_roles_sql(side: Side) -> String {
    side.foreign_roles()
        .iter()
        .map(|role| format!("'{role}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Advance `side`'s read marker of a thread to `now`.
///
/// # Errors
///
/// Returns [`InboxError::ThreadNotFound`] if the thread does not exist,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn mark_read(
    db: &SqlitePool,
    thread_id: &str,
    side: Side,
    now: DateTime<Utc>,
) -> Result<(), InboxError> {
    let column = side.read_column();
    let result = sqlx::query(&format!(
        "UPDATE threads SET {column} = max(COALESCE({column}, ''), ?1) WHERE id = ?2"
    ))
    .bind(format_ts(now))
    .bind(thread_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
    }
    trace!(thread_id, column, "read marker advanced");
    Ok(())
}

/// Unread messages of one thread for `side`.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn unread_count_for(
    db: &SqlitePool,
    thread_id: &str,
    side: Side,
) -> Result<u64, InboxError> {
    let column = side.read_column();
    let roles = foreign_roles_sql(side);
    let row: (i64,) = sqlx::query_as(&format!(
        "SELECT count(m.id) FROM messages m JOIN threads t ON t.id = m.thread_id \
         WHERE t.id = ?1 AND m.author_role IN ({roles}) \
         AND (t.{column} IS NULL OR m.created_at > t.{column})"
    ))
    .bind(thread_id)
    .fetch_one(db)
    .await?;
    Ok(to_count(row.0))
}

/// Unread counts for many threads in one grouped query per chunk.
///
/// Threads without unread messages are absent from the map.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn unread_counts_for(
    db: &SqlitePool,
    thread_ids: &[String],
    side: Side,
) -> Result<HashMap<String, u64>, InboxError> {
    let column = side.read_column();
    let roles = foreign_roles_sql(side);
    let mut counts = HashMap::with_capacity(thread_ids.len());

    for chunk in thread_ids.chunks(IN_CHUNK) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT t.id, count(m.id) FROM messages m JOIN threads t ON t.id = m.thread_id \
             WHERE m.author_role IN ({roles}) \
             AND (t.{column} IS NULL OR m.created_at > t.{column}) \
             AND t.id IN ("
        ));
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(id.clone());
        }
        qb.push(") GROUP BY t.id");

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(db).await?;
        counts.extend(rows.into_iter().map(|(id, n)| (id, to_count(n))));
    }
    Ok(counts)
}

/// Inbox badge: unread messages across a vendor's non-archived threads.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn vendor_badge(db: &SqlitePool, vendor_id: &str) -> Result<u64, InboxError> {
    let column = Side::Vendor.read_column();
    let roles = foreign_roles_sql(Side::Vendor);
    let row: (i64,) = sqlx::query_as(&format!(
        "SELECT count(m.id) FROM messages m JOIN threads t ON t.id = m.thread_id \
         WHERE t.vendor_id = ?1 AND t.archived = 0 AND m.author_role IN ({roles}) \
         AND (t.{column} IS NULL OR m.created_at > t.{column})"
    ))
    .bind(vendor_id)
    .fetch_one(db)
    .await?;
    Ok(to_count(row.0))
}

/// Inbox badge: unread messages across a buyer's non-archived threads.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn buyer_badge(db: &SqlitePool, buyer_user_id: &str) -> Result<u64, InboxError> {
    let column = Side::Counterpart.read_column();
    let roles = foreign_roles_sql(Side::Counterpart);
    let row: (i64,) = sqlx::query_as(&format!(
        "SELECT count(m.id) FROM messages m JOIN threads t ON t.id = m.thread_id \
         WHERE t.buyer_user_id = ?1 AND t.buyer_archived = 0 AND m.author_role IN ({roles}) \
         AND (t.{column} IS NULL OR m.created_at > t.{column})"
    ))
    .bind(buyer_user_id)
    .fetch_one(db)
    .await?;
    Ok(to_count(row.0))
}
