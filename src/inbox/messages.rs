//! Message persistence: append, ordered reads, author edits and deletes.
//!
//! Every write that can change which message is newest also rewrites the
//! thread's `last_message_*` snapshot inside the same transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::trace;

use super::model::{Attachment, AuthorRole, Message};
use super::InboxError;
use crate::clock::{format_ts, parse_ts};

/// Body stored for attachment-only messages.
pub const ATTACHMENT_PLACEHOLDER: &str = "[attachment]";

/// Maximum allowed body size in bytes.
pub const MAX_BODY_SIZE: usize = 16 * 1024;

const MESSAGE_COLUMNS: &str =
    "id, thread_id, author_role, author_display_name, body, attachments, created_at, edited_at";

fn message_from_row(row: &SqliteRow) -> Result<Message, InboxError> {
    let role_raw: String = row.try_get("author_role")?;
    let attachments_raw: String = row.try_get("attachments")?;
    let created_raw: String = row.try_get("created_at")?;
    let edited_raw: Option<String> = row.try_get("edited_at")?;

    Ok(Message {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        author_role: AuthorRole::parse(&role_raw)?,
        author_display_name: row.try_get("author_display_name")?,
        body: row.try_get("body")?,
        attachments: serde_json::from_str(&attachments_raw).map_err(|_| {
            InboxError::CorruptRow {
                field: "attachments",
                value: attachments_raw.clone(),
            }
        })?,
        created_at: parse_ts(&created_raw).ok_or(InboxError::CorruptRow {
            field: "created_at",
            value: created_raw.clone(),
        })?,
        edited_at: edited_raw
            .map(|raw| parse_ts(&raw).ok_or(InboxError::CorruptRow { field: "edited_at", value: raw }))
            .transpose()?,
    })
}

/// Validate attachment references: absolute URL, non-empty name and type.
///
/// # Errors
///
/// Returns [`InboxError::InvalidAttachment`] for the first bad reference.
pub fn validate_attachments(attachments: &[Attachment]) -> Result<(), InboxError> {
    for attachment in attachments {
        url::Url::parse(&attachment.url).map_err(|e| {
            InboxError::InvalidAttachment(format!("{}: {e}", attachment.url))
        })?;
        if attachment.filename.trim().is_empty() {
            return Err(InboxError::InvalidAttachment(format!(
                "{}: missing filename",
                attachment.url
            )));
        }
        if attachment.mime.trim().is_empty() {
            return Err(InboxError::InvalidAttachment(format!(
                "{}: missing mime type",
                attachment.url
            )));
        }
    }
    Ok(())
}

/// Resolve the body to store.
///
/// A blank body is allowed only with attachments, in which case
/// [`ATTACHMENT_PLACEHOLDER`] is stored instead.
///
/// # Errors
///
/// Returns [`InboxError::EmptyMessage`] for a blank body without attachments,
/// or [`InboxError::InvalidArgument`] when it exceeds [`MAX_BODY_SIZE`].
pub fn prepare_body(body: &str, attachments: &[Attachment]) -> Result<String, InboxError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        if attachments.is_empty() {
            return Err(InboxError::EmptyMessage);
        }
        return Ok(ATTACHMENT_PLACEHOLDER.to_owned());
    }
    if trimmed.len() > MAX_BODY_SIZE {
        return Err(InboxError::InvalidArgument {
            field: "body",
            value: format!("{} bytes exceeds {MAX_BODY_SIZE} byte limit", trimmed.len()),
        });
    }
    Ok(trimmed.to_owned())
}

/// A validated message ready for insertion.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Target thread.
    pub thread_id: String,
    /// Author role.
    pub author_role: AuthorRole,
    /// Visitor-supplied name.
    pub author_display_name: Option<String>,
    /// Body as returned by [`prepare_body`].
    pub body: String,
    /// Validated attachments.
    pub attachments: Vec<Attachment>,
    /// Post time.
    pub created_at: DateTime<Utc>,
}

/// Append a message and refresh the thread snapshot atomically.
///
/// The snapshot only moves forward: a message older than the current
/// snapshot (clock skew between instances) leaves it alone. A vendor post
/// also advances the vendor read marker to the post time.
///
/// # Errors
///
/// Returns [`InboxError::ThreadNotFound`] if the thread does not exist
/// (the foreign key rejects the insert), or [`InboxError::Database`] on
/// SQLite failure.
pub async fn append(db: &SqlitePool, msg: &NewMessage) -> Result<Message, InboxError> {
    let attachments_json =
        serde_json::to_string(&msg.attachments).unwrap_or_else(|_| "[]".to_owned());
    let at = format_ts(msg.created_at);

    // The INSERT is the first statement so the transaction takes the write
    // lock up front; a read first would need an upgrade that WAL cannot wait on.
    let mut tx = db.begin().await?;

    let result = sqlx::query(
        "INSERT INTO messages (thread_id, author_role, author_display_name, body, \
         attachments, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&msg.thread_id)
    .bind(msg.author_role.as_str())
    .bind(&msg.author_display_name)
    .bind(&msg.body)
    .bind(&attachments_json)
    .bind(&at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if matches!(&e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation()) {
            InboxError::ThreadNotFound(msg.thread_id.clone())
        } else {
            InboxError::Database(e)
        }
    })?;
    let id = result.last_insert_rowid();

    sqlx::query(
        "UPDATE threads SET last_message_text = ?1, last_message_at = ?2, updated_at = ?2 \
         WHERE id = ?3 AND (last_message_at IS NULL OR last_message_at <= ?2)",
    )
    .bind(&msg.body)
    .bind(&at)
    .bind(&msg.thread_id)
    .execute(&mut *tx)
    .await?;

    if msg.author_role == AuthorRole::Vendor {
        sqlx::query(
            "UPDATE threads SET vendor_last_read_at = max(COALESCE(vendor_last_read_at, ''), ?1) \
             WHERE id = ?2",
        )
        .bind(&at)
        .bind(&msg.thread_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    trace!(thread_id = %msg.thread_id, message_id = id, role = msg.author_role.as_str(), "message appended");

    Ok(Message {
        id,
        thread_id: msg.thread_id.clone(),
        author_role: msg.author_role,
        author_display_name: msg.author_display_name.clone(),
        body: msg.body.clone(),
        attachments: msg.attachments.clone(),
        created_at: msg.created_at,
        edited_at: None,
    })
}

/// All messages of a thread, oldest first; ties keep insertion order.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn list_messages(db: &SqlitePool, thread_id: &str) -> Result<Vec<Message>, InboxError> {
    let rows = sqlx::query(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ?1 \
         ORDER BY created_at ASC, id ASC"
    ))
    .bind(thread_id)
    .fetch_all(db)
    .await?;
    rows.iter().map(message_from_row).collect()
}

/// Load one message.
///
/// # Errors
///
/// Returns [`InboxError::MessageNotFound`] if no message matches,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn load_message(db: &SqlitePool, message_id: i64) -> Result<Message, InboxError> {
    let row = sqlx::query(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
    ))
    .bind(message_id)
    .fetch_optional(db)
    .await?
    .ok_or(InboxError::MessageNotFound(message_id))?;
    message_from_row(&row)
}

/// Rebuild a thread's snapshot from its newest remaining message.
async fn recompute_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    thread_id: &str,
    now: &str,
) -> Result<(), InboxError> {
    sqlx::query(
        "UPDATE threads SET \
         last_message_text = (SELECT body FROM messages WHERE thread_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1), \
         last_message_at = (SELECT created_at FROM messages WHERE thread_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1), \
         updated_at = ?2 \
         WHERE id = ?1",
    )
    .bind(thread_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replace a message body and refresh the thread snapshot.
///
/// # Errors
///
/// Returns [`InboxError::MessageNotFound`] if the message vanished,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn update_body(
    db: &SqlitePool,
    message: &Message,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Message, InboxError> {
    let now_str = format_ts(now);
    let mut tx = db.begin().await?;
    let result = sqlx::query("UPDATE messages SET body = ?1, edited_at = ?2 WHERE id = ?3")
        .bind(body)
        .bind(&now_str)
        .bind(message.id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::MessageNotFound(message.id));
    }
    recompute_snapshot(&mut tx, &message.thread_id, &now_str).await?;
    tx.commit().await?;
    trace!(message_id = message.id, "message edited");

    Ok(Message {
        body: body.to_owned(),
        edited_at: Some(now),
        ..message.clone()
    })
}

/// Delete a message and refresh the thread snapshot.
///
/// # Errors
///
/// Returns [`InboxError::MessageNotFound`] if the message vanished,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn delete(db: &SqlitePool, message: &Message, now: DateTime<Utc>) -> Result<(), InboxError> {
    let now_str = format_ts(now);
    let mut tx = db.begin().await?;
    let result = sqlx::query("DELETE FROM messages WHERE id = ?1")
        .bind(message.id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::MessageNotFound(message.id));
    }
    recompute_snapshot(&mut tx, &message.thread_id, &now_str).await?;
    tx.commit().await?;
    trace!(message_id = message.id, thread_id = %message.thread_id, "message deleted");
    Ok(())
}
