//! Planning view by event date.

use chrono::NaiveDate;

use leadbox::identity::Caller;
use leadbox::inbox::lead::LeadPatch;
use leadbox::inbox::{Counterpart, InboxError, LeadStatus};

use crate::support::{setup, Harness};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn lead_with_event(h: &Harness, user: &str, event_date: &str) -> String {
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer(user), None)
        .await
        .expect("thread");
    let patch: LeadPatch = serde_json::from_str(&format!(
        r#"{{"eventDate": "{event_date}", "eventType": "Wedding", "status": "IN_DISCUSSION"}}"#
    ))
    .expect("patch json");
    h.inbox.update_meta(&thread.id, patch).await.expect("update");
    thread.id
}

#[tokio::test]
async fn june_window_lists_june_events_in_date_order() {
    let h = setup().await;
    let late = lead_with_event(&h, "A", "2025-06-30").await;
    let early = lead_with_event(&h, "B", "2025-06-10").await;
    lead_with_event(&h, "C", "2025-07-02").await;
    lead_with_event(&h, "D", "2025-05-31").await;

    let entries = h
        .inbox
        .list_upcoming_leads("V1", Some(date(2025, 6, 1)), Some(date(2025, 6, 30)))
        .await
        .expect("planning");

    let ids: Vec<&str> = entries.iter().map(|e| e.thread_id.as_str()).collect();
    assert_eq!(ids, [early.as_str(), late.as_str()]);
    let first = entries.first().expect("entry");
    assert_eq!(first.event_date, date(2025, 6, 10));
    assert_eq!(first.status, LeadStatus::InDiscussion);
    assert_eq!(first.event_type.as_deref(), Some("Wedding"));
    assert_eq!(first.display_name, "B");
}

#[tokio::test]
async fn default_window_starts_today() {
    let h = setup().await;
    // Clock is at 2025-06-01; the default window ends 2025-08-30.
    let inside = lead_with_event(&h, "A", "2025-08-30").await;
    lead_with_event(&h, "B", "2025-08-31").await;
    lead_with_event(&h, "C", "2025-05-20").await;

    let entries = h
        .inbox
        .vendor_planning(&Caller::vendor("staff", "V1"), None, None)
        .await
        .expect("planning");

    let ids: Vec<&str> = entries.iter().map(|e| e.thread_id.as_str()).collect();
    assert_eq!(ids, [inside.as_str()]);
}

#[tokio::test]
async fn archived_leads_are_left_out() {
    let h = setup().await;
    let id = lead_with_event(&h, "A", "2025-06-10").await;
    h.inbox
        .vendor_set_archived(&Caller::vendor("staff", "V1"), &id, true)
        .await
        .expect("archive");

    let entries = h
        .inbox
        .list_upcoming_leads("V1", Some(date(2025, 6, 1)), Some(date(2025, 6, 30)))
        .await
        .expect("planning");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn inverted_window_is_empty() {
    let h = setup().await;
    lead_with_event(&h, "A", "2025-06-10").await;

    let entries = h
        .inbox
        .list_upcoming_leads("V1", Some(date(2025, 6, 30)), Some(date(2025, 6, 1)))
        .await
        .expect("planning");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn planning_requires_vendor() {
    let h = setup().await;
    let err = h
        .inbox
        .vendor_planning(&Caller::guest(), None, None)
        .await
        .expect_err("guest");
    assert!(matches!(err, InboxError::Forbidden));
}
