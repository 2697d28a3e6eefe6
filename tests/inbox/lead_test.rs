//! Lead metadata patches.

use chrono::NaiveDate;

use leadbox::identity::Caller;
use leadbox::inbox::lead::LeadPatch;
use leadbox::inbox::threads::load_thread;
use leadbox::inbox::{Counterpart, ErrorKind, InboxError, LeadStatus, Thread};

use crate::support::{setup, ts, Harness};

async fn thread(h: &Harness) -> Thread {
    h.inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread")
}

fn patch(json: &str) -> LeadPatch {
    serde_json::from_str(json).expect("patch json")
}

#[tokio::test]
async fn new_thread_starts_as_new_lead() {
    let h = setup().await;
    let t = thread(&h).await;
    assert_eq!(t.lead.status, LeadStatus::New);
    assert!(t.lead.tags.is_empty());
}

#[tokio::test]
async fn patch_sets_fields() {
    let h = setup().await;
    let t = thread(&h).await;

    let updated = h
        .inbox
        .update_meta(
            &t.id,
            patch(
                r#"{
                    "status": "OFFER_SENT",
                    "tags": ["vip", " wedding ", "vip"],
                    "followUpAt": "2025-06-05T09:00:00Z",
                    "internalNote": "call after 5pm",
                    "eventDate": "2025-09-20",
                    "eventType": "Wedding",
                    "eventLocation": "Lisbon",
                    "budgetMin": 1500,
                    "budgetMax": 3000.5
                }"#,
            ),
        )
        .await
        .expect("update");

    assert_eq!(updated.lead.status, LeadStatus::OfferSent);
    let tags: Vec<&str> = updated.lead.tags.iter().map(String::as_str).collect();
    assert_eq!(tags, ["vip", "wedding"]);
    assert_eq!(updated.lead.follow_up_at, Some(ts(2025, 6, 5, 9, 0)));
    assert_eq!(updated.lead.internal_note.as_deref(), Some("call after 5pm"));
    assert_eq!(updated.lead.event_date, NaiveDate::from_ymd_opt(2025, 9, 20));
    assert_eq!(updated.lead.event_type.as_deref(), Some("Wedding"));
    assert_eq!(updated.lead.budget_min, Some(1500.0));
    assert_eq!(updated.lead.budget_max, Some(3000.5));
}

#[tokio::test]
async fn status_accepts_ui_label() {
    let h = setup().await;
    let t = thread(&h).await;

    let updated = h
        .inbox
        .update_meta(&t.id, patch(r#"{"status": "in discussion"}"#))
        .await
        .expect("update");
    assert_eq!(updated.lead.status, LeadStatus::InDiscussion);

    let updated = h
        .inbox
        .update_meta(&t.id, patch(r#"{"status": "NEW"}"#))
        .await
        .expect("any transition is allowed");
    assert_eq!(updated.lead.status, LeadStatus::New);
}

#[tokio::test]
async fn invalid_status_leaves_thread_unchanged() {
    let h = setup().await;
    let t = thread(&h).await;

    let err = h
        .inbox
        .update_meta(&t.id, patch(r#"{"status": "WON", "internalNote": "x"}"#))
        .await
        .expect_err("unknown status");

    assert!(matches!(err, InboxError::InvalidLeadStatus(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    let stored = load_thread(h.pool(), &t.id).await.expect("load");
    assert_eq!(stored.lead, t.lead);
}

#[tokio::test]
async fn invalid_date_rejects_the_whole_patch() {
    let h = setup().await;
    let t = thread(&h).await;

    let err = h
        .inbox
        .update_meta(
            &t.id,
            patch(r#"{"status": "RESERVED", "tags": ["a"], "eventDate": "next friday"}"#),
        )
        .await
        .expect_err("bad date");

    assert!(matches!(err, InboxError::InvalidDate { field: "eventDate", .. }));
    let stored = load_thread(h.pool(), &t.id).await.expect("load");
    assert_eq!(stored.lead.status, LeadStatus::New);
    assert!(stored.lead.tags.is_empty());
}

#[tokio::test]
async fn negative_budget_is_rejected() {
    let h = setup().await;
    let t = thread(&h).await;

    let err = h
        .inbox
        .update_meta(&t.id, patch(r#"{"budgetMin": -1}"#))
        .await
        .expect_err("negative budget");
    assert!(matches!(err, InboxError::InvalidBudget { .. }));
}

#[tokio::test]
async fn explicit_null_clears_and_absence_keeps() {
    let h = setup().await;
    let t = thread(&h).await;
    h.inbox
        .update_meta(
            &t.id,
            patch(r#"{"followUpAt": "2025-06-05", "internalNote": "keep me"}"#),
        )
        .await
        .expect("seed");

    let updated = h
        .inbox
        .update_meta(&t.id, patch(r#"{"followUpAt": null}"#))
        .await
        .expect("clear");

    assert!(updated.lead.follow_up_at.is_none());
    assert_eq!(updated.lead.internal_note.as_deref(), Some("keep me"));
}

#[tokio::test]
async fn tags_are_replaced_not_merged() {
    let h = setup().await;
    let t = thread(&h).await;
    h.inbox
        .update_meta(&t.id, patch(r#"{"tags": ["a", "b"]}"#))
        .await
        .expect("first");

    let updated = h
        .inbox
        .update_meta(&t.id, patch(r#"{"tags": ["c"]}"#))
        .await
        .expect("second");

    let tags: Vec<&str> = updated.lead.tags.iter().map(String::as_str).collect();
    assert_eq!(tags, ["c"]);
}

#[tokio::test]
async fn patching_missing_thread_fails() {
    let h = setup().await;

    let err = h
        .inbox
        .update_meta("missing", patch(r#"{"status": "LOST"}"#))
        .await
        .expect_err("missing");
    assert!(matches!(err, InboxError::ThreadNotFound(_)));
}

#[tokio::test]
async fn other_vendor_cannot_patch() {
    let h = setup().await;
    let t = thread(&h).await;

    let err = h
        .inbox
        .vendor_update_meta(
            &Caller::vendor("staff", "V2"),
            &t.id,
            patch(r#"{"status": "LOST"}"#),
        )
        .await
        .expect_err("not V2's thread");
    assert!(matches!(err, InboxError::ThreadNotFound(_)));
    let stored = load_thread(h.pool(), &t.id).await.expect("load");
    assert_eq!(stored.lead.status, LeadStatus::New);
}

#[tokio::test]
async fn corrupt_stored_tags_are_reported() {
    let h = setup().await;
    let t = thread(&h).await;
    sqlx::query("UPDATE threads SET lead_tags = 'wedding,vip' WHERE id = ?1")
        .bind(&t.id)
        .execute(h.pool())
        .await
        .expect("corrupt row");

    let err = load_thread(h.pool(), &t.id).await.expect_err("corrupt tags");
    assert!(
        matches!(err, InboxError::CorruptRow { field: "lead_tags", ref value } if value == "wedding,vip")
    );
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn corrupt_stored_event_date_is_reported() {
    let h = setup().await;
    let t = thread(&h).await;
    sqlx::query("UPDATE threads SET event_date = '14/06/2025' WHERE id = ?1")
        .bind(&t.id)
        .execute(h.pool())
        .await
        .expect("corrupt row");

    let err = h
        .inbox
        .vendor_thread(&Caller::vendor("staff", "V1"), &t.id)
        .await
        .expect_err("corrupt event date");
    assert!(matches!(err, InboxError::CorruptRow { field: "event_date", .. }));
}
