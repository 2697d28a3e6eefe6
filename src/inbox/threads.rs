//! Thread persistence and queries.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::trace;

use super::model::{ContactInfo, Counterpart, LastMessage, Lead, LeadStatus, Side, Thread};
use super::InboxError;
use crate::clock::{format_date, format_ts, parse_date, parse_ts};

/// Column list shared by every thread `SELECT`, in [`thread_from_row`] order.
pub(crate) const THREAD_COLUMNS: &str = "id, vendor_id, buyer_user_id, buyer_name, \
     contact_name, contact_email, contact_phone, order_id, last_message_text, \
     last_message_at, vendor_last_read_at, buyer_last_read_at, archived, buyer_archived, \
     lead_status, lead_tags, follow_up_at, internal_note, event_date, event_type, \
     event_location, budget_min, budget_max, created_at, updated_at";

/// Sort key of a thread: newest message, else creation.
pub(crate) const LAST_AT_SQL: &str = "COALESCE(last_message_at, created_at)";

fn required_ts(row: &SqliteRow, field: &'static str) -> Result<DateTime<Utc>, InboxError> {
    let raw: String = row.try_get(field)?;
    parse_ts(&raw).ok_or(InboxError::CorruptRow { field, value: raw })
}

fn optional_ts(row: &SqliteRow, field: &'static str) -> Result<Option<DateTime<Utc>>, InboxError> {
    let raw: Option<String> = row.try_get(field)?;
    raw.map(|raw| parse_ts(&raw).ok_or(InboxError::CorruptRow { field, value: raw }))
        .transpose()
}

/// Decode one row selected with [`THREAD_COLUMNS`].
pub(crate) fn thread_from_row(row: &SqliteRow) -> Result<Thread, InboxError> {
    let buyer_user_id: Option<String> = row.try_get("buyer_user_id")?;
    let counterpart = match buyer_user_id {
        Some(user_id) => Counterpart::Buyer {
            user_id,
            name: row.try_get("buyer_name")?,
        },
        None => Counterpart::Contact(ContactInfo {
            name: row.try_get("contact_name")?,
            email: row.try_get("contact_email")?,
            phone: row.try_get("contact_phone")?,
        }),
    };

    let last_text: Option<String> = row.try_get("last_message_text")?;
    let last_at = optional_ts(row, "last_message_at")?;
    let last_message = match (last_text, last_at) {
        (Some(text), Some(at)) => Some(LastMessage { text, at }),
        _ => None,
    };

    let status_raw: String = row.try_get("lead_status")?;
    let status = LeadStatus::parse(&status_raw).map_err(|_| InboxError::CorruptRow {
        field: "lead_status",
        value: status_raw.clone(),
    })?;
    let tags_raw: String = row.try_get("lead_tags")?;
    let tags = serde_json::from_str(&tags_raw).map_err(|_| InboxError::CorruptRow {
        field: "lead_tags",
        value: tags_raw.clone(),
    })?;
    let event_date: Option<String> = row.try_get("event_date")?;
    let event_date = event_date
        .map(|raw| parse_date(&raw).ok_or(InboxError::CorruptRow { field: "event_date", value: raw }))
        .transpose()?;

    Ok(Thread {
        id: row.try_get("id")?,
        vendor_id: row.try_get("vendor_id")?,
        counterpart,
        order_id: row.try_get("order_id")?,
        last_message,
        vendor_last_read_at: optional_ts(row, "vendor_last_read_at")?,
        buyer_last_read_at: optional_ts(row, "buyer_last_read_at")?,
        archived: row.try_get("archived")?,
        buyer_archived: row.try_get("buyer_archived")?,
        lead: Lead {
            status,
            tags,
            follow_up_at: optional_ts(row, "follow_up_at")?,
            internal_note: row.try_get("internal_note")?,
            event_date,
            event_type: row.try_get("event_type")?,
            event_location: row.try_get("event_location")?,
            budget_min: row.try_get("budget_min")?,
            budget_max: row.try_get("budget_max")?,
        },
        created_at: required_ts(row, "created_at")?,
        updated_at: required_ts(row, "updated_at")?,
    })
}

/// A thread about to be inserted.
#[derive(Debug, Clone)]
pub struct NewThread {
    /// Fresh id.
    pub id: String,
    /// Owning vendor.
    pub vendor_id: String,
    /// Counterpart (already seeded from order data where applicable).
    pub counterpart: Counterpart,
    /// Storage key of the counterpart.
    pub counterpart_key: String,
    /// Bound order.
    pub order_id: Option<String>,
    /// Initial lead fields.
    pub lead: Lead,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Insert `thread` unless its (vendor, counterpart, order) triple exists.
///
/// Returns `true` if this call created the row. A `false` means a concurrent
/// or earlier writer owns the triple; callers re-read it.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn insert_if_absent(db: &SqlitePool, thread: &NewThread) -> Result<bool, InboxError> {
    let (buyer_user_id, buyer_name, contact) = match &thread.counterpart {
        Counterpart::Buyer { user_id, name } => {
            (Some(user_id.as_str()), name.as_deref(), ContactInfo::default())
        }
        Counterpart::Contact(info) => (None, None, info.normalized()),
    };
    let tags = serde_json::to_string(&thread.lead.tags).unwrap_or_else(|_| "[]".to_owned());
    let created = format_ts(thread.created_at);

    let result = sqlx::query(
        "INSERT INTO threads (id, vendor_id, counterpart_key, buyer_user_id, buyer_name, \
         contact_name, contact_email, contact_phone, email_key, phone_key, order_id, \
         order_key, lead_status, lead_tags, event_date, event_type, event_location, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
         ?17, ?18, ?18) \
         ON CONFLICT (vendor_id, counterpart_key, order_key) DO NOTHING",
    )
    .bind(&thread.id)
    .bind(&thread.vendor_id)
    .bind(&thread.counterpart_key)
    .bind(buyer_user_id)
    .bind(buyer_name)
    .bind(&contact.name)
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(thread.counterpart.email_key())
    .bind(thread.counterpart.phone_key())
    .bind(&thread.order_id)
    .bind(thread.order_id.as_deref().unwrap_or(""))
    .bind(thread.lead.status.as_str())
    .bind(&tags)
    .bind(thread.lead.event_date.map(format_date))
    .bind(&thread.lead.event_type)
    .bind(&thread.lead.event_location)
    .bind(&created)
    .execute(db)
    .await?;

    let created_row = result.rows_affected() == 1;
    trace!(thread_id = %thread.id, created = created_row, "thread insert attempted");
    Ok(created_row)
}

/// Find the thread of a (vendor, counterpart key, order) triple.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn find_by_triple(
    db: &SqlitePool,
    vendor_id: &str,
    counterpart_key: &str,
    order_id: Option<&str>,
) -> Result<Option<Thread>, InboxError> {
    let row = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM threads \
         WHERE vendor_id = ?1 AND counterpart_key = ?2 AND order_key = ?3"
    ))
    .bind(vendor_id)
    .bind(counterpart_key)
    .bind(order_id.unwrap_or(""))
    .fetch_optional(db)
    .await?;
    row.as_ref().map(thread_from_row).transpose()
}

/// Find an anonymous thread of the vendor whose stored email or phone
/// matches one of the given identifiers. The oldest match wins.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn find_by_contact(
    db: &SqlitePool,
    vendor_id: &str,
    email_key: Option<&str>,
    phone_key: Option<&str>,
    order_id: Option<&str>,
) -> Result<Option<Thread>, InboxError> {
    if email_key.is_none() && phone_key.is_none() {
        return Ok(None);
    }
    let row = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM threads \
         WHERE vendor_id = ?1 AND order_key = ?2 AND buyer_user_id IS NULL \
         AND (email_key = ?3 OR phone_key = ?4) \
         ORDER BY created_at ASC, id ASC LIMIT 1"
    ))
    .bind(vendor_id)
    .bind(order_id.unwrap_or(""))
    .bind(email_key)
    .bind(phone_key)
    .fetch_optional(db)
    .await?;
    row.as_ref().map(thread_from_row).transpose()
}

/// Fill the blank contact fields of an anonymous thread from `info`.
/// Fields already stored are never overwritten.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn absorb_contact(
    db: &SqlitePool,
    thread_id: &str,
    counterpart: &Counterpart,
) -> Result<(), InboxError> {
    let Counterpart::Contact(info) = counterpart else {
        return Ok(());
    };
    let info = info.normalized();
    sqlx::query(
        "UPDATE threads SET \
         contact_name = COALESCE(contact_name, ?2), \
         contact_email = COALESCE(contact_email, ?3), \
         email_key = COALESCE(email_key, ?4), \
         contact_phone = COALESCE(contact_phone, ?5), \
         phone_key = COALESCE(phone_key, ?6) \
         WHERE id = ?1 AND buyer_user_id IS NULL",
    )
    .bind(thread_id)
    .bind(&info.name)
    .bind(&info.email)
    .bind(counterpart.email_key())
    .bind(&info.phone)
    .bind(counterpart.phone_key())
    .execute(db)
    .await?;
    Ok(())
}

/// Load a thread by id.
///
/// # Errors
///
/// Returns [`InboxError::ThreadNotFound`] if no thread matches,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn load_thread(db: &SqlitePool, thread_id: &str) -> Result<Thread, InboxError> {
    let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"))
        .bind(thread_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| InboxError::ThreadNotFound(thread_id.to_owned()))?;
    thread_from_row(&row)
}

/// Vendor-side selection criteria for [`list_for_vendor`].
#[derive(Debug, Clone, Default)]
pub struct ThreadFilter {
    /// `true` selects archived threads, `false` active ones.
    pub archived: bool,
    /// Case-insensitive substring over contact fields, buyer name and
    /// last message.
    pub search: Option<String>,
    /// Exact lead status.
    pub status: Option<LeadStatus>,
    /// Exact event type (case-insensitive).
    pub event_type: Option<String>,
    /// Inclusive lower bound on `event_date`.
    pub event_from: Option<NaiveDate>,
    /// Inclusive upper bound on `event_date`.
    pub event_to: Option<NaiveDate>,
    /// Exclusive upper bound on `event_date`.
    pub event_before: Option<NaiveDate>,
}

/// Escape LIKE metacharacters and wrap in `%..%`.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len().saturating_add(2));
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// All threads of a vendor matching `filter`, newest activity first.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn list_for_vendor(
    db: &SqlitePool,
    vendor_id: &str,
    filter: &ThreadFilter,
) -> Result<Vec<Thread>, InboxError> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {THREAD_COLUMNS} FROM threads WHERE vendor_id = "
    ));
    qb.push_bind(vendor_id.to_owned());
    qb.push(" AND archived = ").push_bind(filter.archived);

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (");
        for (i, column) in [
            "contact_name",
            "contact_email",
            "contact_phone",
            "buyer_name",
            "last_message_text",
        ]
        .iter()
        .enumerate()
        {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column)
                .push(" LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND lead_status = ").push_bind(status.as_str());
    }
    if let Some(event_type) = filter.event_type.as_deref() {
        qb.push(" AND event_type = ")
            .push_bind(event_type.trim().to_owned())
            .push(" COLLATE NOCASE");
    }
    if let Some(from) = filter.event_from {
        qb.push(" AND event_date >= ").push_bind(format_date(from));
    }
    if let Some(to) = filter.event_to {
        qb.push(" AND event_date <= ").push_bind(format_date(to));
    }
    if let Some(before) = filter.event_before {
        qb.push(" AND event_date < ").push_bind(format_date(before));
    }
    qb.push(format!(" ORDER BY {LAST_AT_SQL} DESC, id ASC"));

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(thread_from_row).collect()
}

/// Threads of a registered buyer, newest activity first.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn list_for_buyer(
    db: &SqlitePool,
    buyer_user_id: &str,
    archived: bool,
) -> Result<Vec<Thread>, InboxError> {
    let rows = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM threads \
         WHERE buyer_user_id = ?1 AND buyer_archived = ?2 \
         ORDER BY {LAST_AT_SQL} DESC, id ASC"
    ))
    .bind(buyer_user_id)
    .bind(archived)
    .fetch_all(db)
    .await?;
    rows.iter().map(thread_from_row).collect()
}

/// Non-archived vendor threads with `event_date` in `[from, to]`, ordered by
/// event date ascending then newest activity.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn list_by_event_window(
    db: &SqlitePool,
    vendor_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Thread>, InboxError> {
    let rows = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM threads \
         WHERE vendor_id = ?1 AND archived = 0 \
         AND event_date IS NOT NULL AND event_date >= ?2 AND event_date <= ?3 \
         ORDER BY event_date ASC, {LAST_AT_SQL} DESC, id ASC"
    ))
    .bind(vendor_id)
    .bind(format_date(from))
    .bind(format_date(to))
    .fetch_all(db)
    .await?;
    rows.iter().map(thread_from_row).collect()
}

/// Set the archive flag of one side.
///
/// # Errors
///
/// Returns [`InboxError::ThreadNotFound`] if the thread vanished,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn set_archived(
    db: &SqlitePool,
    thread_id: &str,
    side: Side,
    archived: bool,
    now: DateTime<Utc>,
) -> Result<(), InboxError> {
    let column = match side {
        Side::Vendor => "archived",
        Side::Counterpart => "buyer_archived",
    };
    let result = sqlx::query(&format!(
        "UPDATE threads SET {column} = ?1, updated_at = ?2 WHERE id = ?3"
    ))
    .bind(archived)
    .bind(format_ts(now))
    .bind(thread_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
    }
    trace!(thread_id, column, archived, "thread archive flag set");
    Ok(())
}

/// Delete a thread; messages follow through `ON DELETE CASCADE`.
///
/// # Errors
///
/// Returns [`InboxError::ThreadNotFound`] if nothing was deleted,
/// or [`InboxError::Database`] on SQLite failure.
pub async fn delete_thread(db: &SqlitePool, thread_id: &str) -> Result<(), InboxError> {
    let result = sqlx::query("DELETE FROM threads WHERE id = ?1")
        .bind(thread_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
    }
    trace!(thread_id, "thread deleted");
    Ok(())
}

/// Row counts for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct InboxStats {
    /// All threads.
    pub threads: u64,
    /// Threads archived by their vendor.
    pub archived_threads: u64,
    /// All messages.
    pub messages: u64,
}

/// Count threads and messages.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn stats(db: &SqlitePool) -> Result<InboxStats, InboxError> {
    let (threads, archived, messages): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT count(*) FROM threads), \
         (SELECT count(*) FROM threads WHERE archived = 1), \
         (SELECT count(*) FROM messages)",
    )
    .fetch_one(db)
    .await?;
    Ok(InboxStats {
        threads: u64::try_from(threads).unwrap_or(0),
        archived_threads: u64::try_from(archived).unwrap_or(0),
        messages: u64::try_from(messages).unwrap_or(0),
    })
}
