//! Inbox views: per-order (one item per thread) or per-counterpart
//! (all threads with the same registered buyer folded into one item).

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use super::model::{Counterpart, LeadStatus, Side, Thread};
use super::read_state::unread_counts_for;
use super::threads::{list_for_buyer, list_for_vendor, ThreadFilter};
use super::InboxError;

/// Which archive state to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Not archived.
    #[default]
    Active,
    /// Archived.
    Archived,
}

impl Scope {
    /// Parse `active` / `archived`.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::InvalidArgument`] for anything else.
    pub fn parse(s: &str) -> Result<Self, InboxError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            _ => Err(InboxError::InvalidArgument {
                field: "scope",
                value: s.to_owned(),
            }),
        }
    }

    fn archived(self) -> bool {
        self == Self::Archived
    }
}

/// How threads are folded into inbox items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One item per thread.
    #[default]
    Order,
    /// One item per registered buyer; anonymous threads stay separate.
    Counterpart,
}

impl GroupBy {
    /// Parse `order` / `counterpart`.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::InvalidArgument`] for anything else.
    pub fn parse(s: &str) -> Result<Self, InboxError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(Self::Order),
            "counterpart" => Ok(Self::Counterpart),
            _ => Err(InboxError::InvalidArgument {
                field: "groupBy",
                value: s.to_owned(),
            }),
        }
    }
}

/// Event-date filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventWindow {
    /// Event date from today through the configured upcoming horizon.
    #[serde(rename = "upcoming-30d")]
    Upcoming,
    /// Event date before today.
    #[serde(rename = "past")]
    Past,
    /// No event-date restriction.
    #[default]
    #[serde(rename = "all")]
    All,
}

impl EventWindow {
    /// Parse `upcoming-30d` / `past` / `all`.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::InvalidArgument`] for anything else.
    pub fn parse(s: &str) -> Result<Self, InboxError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming-30d" | "upcoming" => Ok(Self::Upcoming),
            "past" => Ok(Self::Past),
            "all" => Ok(Self::All),
            _ => Err(InboxError::InvalidArgument {
                field: "eventWindow",
                value: s.to_owned(),
            }),
        }
    }
}

/// A vendor inbox listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListQuery {
    /// Archive state.
    pub scope: Scope,
    /// Free-text search.
    pub search: Option<String>,
    /// Lead status filter.
    pub status: Option<LeadStatus>,
    /// Event type filter.
    pub event_type: Option<String>,
    /// Event date filter.
    pub event_window: EventWindow,
    /// Folding mode.
    pub group_by: GroupBy,
    /// Page size; clamped to the configured maximum.
    pub limit: Option<usize>,
    /// Items to skip.
    pub offset: usize,
}

/// Page-size policy applied to list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Used when the request gives no limit.
    pub default: usize,
    /// Hard ceiling.
    pub max: usize,
}

impl PageLimits {
    fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default)
            .clamp(1, self.max.max(1))
    }
}

/// A thread with its unread count and display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// The thread.
    #[serde(flatten)]
    pub thread: Thread,
    /// Label for the counterpart.
    pub display_name: String,
    /// Unread messages for the viewing side.
    pub unread_count: u64,
    /// Newest activity.
    pub last_at: DateTime<Utc>,
}

impl ThreadSummary {
    fn new(thread: Thread, unread_count: u64) -> Self {
        Self {
            display_name: thread.counterpart.display_name(),
            last_at: thread.last_at(),
            thread,
            unread_count,
        }
    }
}

/// One row of the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    /// `buyer:<userId>` or `thread:<threadId>`.
    pub key: String,
    /// Most recent member; supplies the display fields.
    pub representative: ThreadSummary,
    /// Sum of member unread counts.
    pub unread_count: u64,
    /// Newest activity across members.
    pub last_at: DateTime<Utc>,
    /// All member threads, newest activity first.
    pub members: Vec<ThreadSummary>,
}

/// Grouping key of a thread under `group_by`.
fn group_key(thread: &Thread, group_by: GroupBy) -> String {
    match (group_by, &thread.counterpart) {
        (GroupBy::Counterpart, Counterpart::Buyer { user_id, .. }) => format!("buyer:{user_id}"),
        _ => format!("thread:{}", thread.id),
    }
}

/// Fold threads into inbox items.
///
/// Members of an item are ordered by `last_at` descending (ties: thread id);
/// items by their newest `last_at` descending (ties: key).
pub fn group_threads(
    threads: Vec<Thread>,
    unread: &HashMap<String, u64>,
    group_by: GroupBy,
) -> Vec<InboxItem> {
    let mut groups: HashMap<String, Vec<ThreadSummary>> = HashMap::new();
    for thread in threads {
        let key = group_key(&thread, group_by);
        let count = unread.get(&thread.id).copied().unwrap_or(0);
        groups
            .entry(key)
            .or_default()
            .push(ThreadSummary::new(thread, count));
    }

    let mut items: Vec<InboxItem> = groups
        .into_iter()
        .filter_map(|(key, mut members)| {
            members.sort_by(|a, b| {
                b.last_at
                    .cmp(&a.last_at)
                    .then_with(|| a.thread.id.cmp(&b.thread.id))
            });
            let representative = members.first()?.clone();
            let unread_count = members
                .iter()
                .fold(0u64, |acc, m| acc.saturating_add(m.unread_count));
            Some(InboxItem {
                key,
                last_at: representative.last_at,
                representative,
                unread_count,
                members,
            })
        })
        .collect();

    items.sort_by(|a, b| b.last_at.cmp(&a.last_at).then_with(|| a.key.cmp(&b.key)));
    items
}

/// Unread counts for `threads`, or an empty map (all zero) on failure.
async fn unread_or_zero(db: &SqlitePool, threads: &[Thread], side: Side) -> HashMap<String, u64> {
    let ids: Vec<String> = threads.iter().map(|t| t.id.clone()).collect();
    match unread_counts_for(db, &ids, side).await {
        Ok(counts) => counts,
        Err(err) => {
            warn!(error = %err, threads = ids.len(), "unread computation failed; reporting zero");
            HashMap::new()
        }
    }
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

/// List a vendor's inbox.
///
/// # Errors
///
/// Returns [`InboxError::Database`] if the thread query fails. Unread count
/// failures degrade to zero instead.
pub async fn list_threads(
    db: &SqlitePool,
    vendor_id: &str,
    query: &ListQuery,
    today: NaiveDate,
    upcoming_days: u32,
    limits: PageLimits,
) -> Result<Vec<InboxItem>, InboxError> {
    let mut filter = ThreadFilter {
        archived: query.scope.archived(),
        search: query.search.clone(),
        status: query.status,
        event_type: query.event_type.clone(),
        ..ThreadFilter::default()
    };
    match query.event_window {
        EventWindow::Upcoming => {
            filter.event_from = Some(today);
            filter.event_to = Some(add_days(today, upcoming_days));
        }
        EventWindow::Past => filter.event_before = Some(today),
        EventWindow::All => {}
    }

    let threads = list_for_vendor(db, vendor_id, &filter).await?;
    let unread = unread_or_zero(db, &threads, Side::Vendor).await;

    Ok(group_threads(threads, &unread, query.group_by)
        .into_iter()
        .skip(query.offset)
        .take(limits.resolve(query.limit))
        .collect())
}

/// List a registered buyer's threads, newest activity first.
///
/// # Errors
///
/// Returns [`InboxError::Database`] if the thread query fails.
pub async fn list_buyer_threads(
    db: &SqlitePool,
    buyer_user_id: &str,
    scope: Scope,
) -> Result<Vec<ThreadSummary>, InboxError> {
    let threads = list_for_buyer(db, buyer_user_id, scope.archived()).await?;
    let unread = unread_or_zero(db, &threads, Side::Counterpart).await;
    Ok(threads
        .into_iter()
        .map(|t| {
            let count = unread.get(&t.id).copied().unwrap_or(0);
            ThreadSummary::new(t, count)
        })
        .collect())
}
