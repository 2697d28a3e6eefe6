//! Lead (sales funnel) metadata patches.
//!
//! A [`LeadPatch`] is parsed and validated in full before anything is
//! written; the write itself is a single `UPDATE`. Either every field of the
//! patch lands or none does.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::model::{LeadStatus, Thread};
use super::threads::load_thread;
use super::InboxError;
use crate::clock::{format_date, format_ts};

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Raw metadata patch as received from a client.
///
/// Absent fields are left untouched. Scalar fields set to `null` are cleared.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    /// New status (code or UI label).
    #[serde(default)]
    pub status: Option<String>,
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Follow-up instant (RFC 3339 or `YYYY-MM-DD`).
    #[serde(default, deserialize_with = "double_option")]
    pub follow_up_at: Option<Option<String>>,
    /// Vendor-only note.
    #[serde(default, deserialize_with = "double_option")]
    pub internal_note: Option<Option<String>>,
    /// Event date (`YYYY-MM-DD` or RFC 3339).
    #[serde(default, deserialize_with = "double_option")]
    pub event_date: Option<Option<String>>,
    /// Event type.
    #[serde(default, deserialize_with = "double_option")]
    pub event_type: Option<Option<String>>,
    /// Event location.
    #[serde(default, deserialize_with = "double_option")]
    pub event_location: Option<Option<String>>,
    /// Lower budget bound.
    #[serde(default, deserialize_with = "double_option")]
    pub budget_min: Option<Option<f64>>,
    /// Upper budget bound.
    #[serde(default, deserialize_with = "double_option")]
    pub budget_max: Option<Option<f64>>,
}

impl LeadPatch {
    /// `true` when the patch touches nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A patch whose every field has been parsed.
#[derive(Debug, Clone, Default, PartialEq)]
struct ValidPatch {
    status: Option<LeadStatus>,
    tags: Option<BTreeSet<String>>,
    follow_up_at: Option<Option<DateTime<Utc>>>,
    internal_note: Option<Option<String>>,
    event_date: Option<Option<NaiveDate>>,
    event_type: Option<Option<String>>,
    event_location: Option<Option<String>>,
    budget_min: Option<Option<f64>>,
    budget_max: Option<Option<f64>>,
}

/// Parse an instant: RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (UTC), or a bare
/// date (midnight UTC).
pub fn parse_instant(field: &'static str, raw: &str) -> Result<DateTime<Utc>, InboxError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| InboxError::InvalidDate {
            field,
            value: raw.to_owned(),
        })
}

/// Parse a calendar date: `YYYY-MM-DD` or the UTC date of an RFC 3339 instant.
pub fn parse_event_date(field: &'static str, raw: &str) -> Result<NaiveDate, InboxError> {
    let s = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| InboxError::InvalidDate {
            field,
            value: raw.to_owned(),
        })
}

fn clean_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

fn check_budget(field: &'static str, v: Option<f64>) -> Result<Option<f64>, InboxError> {
    match v {
        Some(value) if !value.is_finite() || value < 0.0 => {
            Err(InboxError::InvalidBudget { field, value })
        }
        other => Ok(other),
    }
}

fn validate(patch: LeadPatch) -> Result<ValidPatch, InboxError> {
    let status = patch.status.as_deref().map(LeadStatus::parse).transpose()?;

    let tags = patch.tags.map(|tags| {
        tags.into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
    });

    let follow_up_at = patch
        .follow_up_at
        .map(|v| {
            clean_text(v)
                .map(|raw| parse_instant("followUpAt", &raw))
                .transpose()
        })
        .transpose()?;

    let event_date = patch
        .event_date
        .map(|v| {
            clean_text(v)
                .map(|raw| parse_event_date("eventDate", &raw))
                .transpose()
        })
        .transpose()?;

    let budget_min = patch
        .budget_min
        .map(|v| check_budget("budgetMin", v))
        .transpose()?;
    let budget_max = patch
        .budget_max
        .map(|v| check_budget("budgetMax", v))
        .transpose()?;

    Ok(ValidPatch {
        status,
        tags,
        follow_up_at,
        internal_note: patch.internal_note.map(clean_text),
        event_date,
        event_type: patch.event_type.map(clean_text),
        event_location: patch.event_location.map(clean_text),
        budget_min,
        budget_max,
    })
}

/// Apply `patch` to a thread and return the updated thread.
///
/// Status transitions are unrestricted. Validation failures leave the thread
/// untouched.
///
/// # Errors
///
/// Returns [`InboxError::InvalidLeadStatus`], [`InboxError::InvalidDate`] or
/// [`InboxError::InvalidBudget`] for bad input, [`InboxError::ThreadNotFound`]
/// if the thread does not exist, or [`InboxError::Database`] on SQLite failure.
pub async fn update_meta(
    db: &SqlitePool,
    thread_id: &str,
    patch: LeadPatch,
    now: DateTime<Utc>,
) -> Result<Thread, InboxError> {
    let valid = validate(patch)?;

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE threads SET updated_at = ");
    qb.push_bind(format_ts(now));
    if let Some(status) = valid.status {
        qb.push(", lead_status = ").push_bind(status.as_str());
    }
    if let Some(tags) = &valid.tags {
        let json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_owned());
        qb.push(", lead_tags = ").push_bind(json);
    }
    if let Some(v) = valid.follow_up_at {
        qb.push(", follow_up_at = ").push_bind(v.map(format_ts));
    }
    if let Some(v) = valid.internal_note {
        qb.push(", internal_note = ").push_bind(v);
    }
    if let Some(v) = valid.event_date {
        qb.push(", event_date = ").push_bind(v.map(format_date));
    }
    if let Some(v) = valid.event_type {
        qb.push(", event_type = ").push_bind(v);
    }
    if let Some(v) = valid.event_location {
        qb.push(", event_location = ").push_bind(v);
    }
    if let Some(v) = valid.budget_min {
        qb.push(", budget_min = ").push_bind(v);
    }
    if let Some(v) = valid.budget_max {
        qb.push(", budget_max = ").push_bind(v);
    }
    qb.push(" WHERE id = ").push_bind(thread_id.to_owned());

    let result = qb.build().execute(db).await?;
    if result.rows_affected() == 0 {
        return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
    }
    debug!(thread_id, status = ?valid.status.map(|s| s.as_str()), "lead metadata updated");

    load_thread(db, thread_id).await
}
