//! Calendar projection of leads by event date. Read-only.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::model::{LeadStatus, Thread};
use super::threads::list_by_event_window;
use super::InboxError;

/// One calendar row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningEntry {
    /// Thread id.
    pub thread_id: String,
    /// Event date.
    pub event_date: NaiveDate,
    /// Event type.
    pub event_type: Option<String>,
    /// Event location.
    pub event_location: Option<String>,
    /// Funnel position.
    pub status: LeadStatus,
    /// Counterpart label.
    pub display_name: String,
    /// Bound order, if any.
    pub order_id: Option<String>,
    /// Lower budget bound.
    pub budget_min: Option<f64>,
    /// Upper budget bound.
    pub budget_max: Option<f64>,
    /// Newest activity in the thread.
    pub last_at: DateTime<Utc>,
}

impl PlanningEntry {
    fn from_thread(thread: Thread) -> Option<Self> {
        let event_date = thread.lead.event_date?;
        Some(Self {
            event_date,
            display_name: thread.counterpart.display_name(),
            last_at: thread.last_at(),
            status: thread.lead.status,
            budget_min: thread.lead.budget_min,
            budget_max: thread.lead.budget_max,
            event_type: thread.lead.event_type,
            event_location: thread.lead.event_location,
            order_id: thread.order_id,
            thread_id: thread.id,
        })
    }
}

/// Resolve an optional window against `today`: `[today, today + days]` by
/// default. A missing `to` is `from + days`.
pub fn resolve_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
    days: u32,
) -> (NaiveDate, NaiveDate) {
    let from = from.unwrap_or(today);
    let to = to.unwrap_or_else(|| {
        from.checked_add_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MAX)
    });
    (from, to)
}

/// Non-archived leads of a vendor with an event date in `[from, to]`,
/// ordered by event date ascending then newest activity.
///
/// An inverted window yields no entries.
///
/// # Errors
///
/// Returns [`InboxError::Database`] on SQLite failure.
pub async fn list_upcoming_leads(
    db: &SqlitePool,
    vendor_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<PlanningEntry>, InboxError> {
    if from > to {
        return Ok(Vec::new());
    }
    let threads = list_by_event_window(db, vendor_id, from, to).await?;
    Ok(threads
        .into_iter()
        .filter_map(PlanningEntry::from_thread)
        .collect())
}
