//! Posting, ordering, snapshots and author edits.

use std::sync::Arc;

use leadbox::identity::Caller;
use leadbox::inbox::messages::{self, NewMessage, ATTACHMENT_PLACEHOLDER};
use leadbox::inbox::threads::load_thread;
use leadbox::inbox::{Attachment, AuthorRole, Counterpart, ErrorKind, Inbox, InboxError};

use crate::support::{count, setup, ts};

fn photo() -> Attachment {
    Attachment {
        url: "https://files.example.com/a/venue.jpg".to_owned(),
        filename: "venue.jpg".to_owned(),
        mime: "image/jpeg".to_owned(),
    }
}

#[tokio::test]
async fn messages_list_in_post_order() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    for body in ["one", "two", "three"] {
        h.inbox
            .post_message(&thread.id, AuthorRole::Buyer, body, Vec::new())
            .await
            .expect("post");
    }
    // Same timestamp for every post: ties break on insertion id.
    let listed = h
        .inbox
        .vendor_messages(&Caller::vendor("staff", "V1"), &thread.id)
        .await
        .expect("list");

    let bodies: Vec<&str> = listed.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["one", "two", "three"]);
}

#[tokio::test]
async fn snapshot_tracks_newest_message() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "  hello  ", Vec::new())
        .await
        .expect("post");
    h.clock.advance_secs(60);
    h.inbox
        .post_message(&thread.id, AuthorRole::Vendor, "hi there", Vec::new())
        .await
        .expect("reply");

    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    let last = stored.last_message.expect("snapshot");
    assert_eq!(last.text, "hi there");
    assert_eq!(last.at, ts(2025, 6, 1, 10, 1));
}

#[tokio::test]
async fn body_is_trimmed() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    let message = h
        .inbox
        .post_message(&thread.id, AuthorRole::Buyer, "\n  hello \t", Vec::new())
        .await
        .expect("post");
    assert_eq!(message.body, "hello");
}

#[tokio::test]
async fn blank_message_is_rejected_without_writing() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    let err = h
        .inbox
        .post_message(&thread.id, AuthorRole::Buyer, "   ", Vec::new())
        .await
        .expect_err("blank body");

    assert!(matches!(err, InboxError::EmptyMessage));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(count(h.pool(), "messages").await, 0);
    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    assert!(stored.last_message.is_none());
}

#[tokio::test]
async fn attachment_only_message_uses_placeholder() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    let message = h
        .inbox
        .post_message(&thread.id, AuthorRole::Buyer, "", vec![photo()])
        .await
        .expect("post");

    assert_eq!(message.body, ATTACHMENT_PLACEHOLDER);
    assert_eq!(message.attachments, vec![photo()]);
}

#[tokio::test]
async fn malformed_attachment_is_rejected() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    let broken = Attachment {
        url: "not a url".to_owned(),
        ..photo()
    };

    let err = h
        .inbox
        .post_message(&thread.id, AuthorRole::Buyer, "see file", vec![broken])
        .await
        .expect_err("bad url");

    assert!(matches!(err, InboxError::InvalidAttachment(_)));
    assert_eq!(count(h.pool(), "messages").await, 0);
}

#[tokio::test]
async fn posting_to_missing_thread_fails() {
    let h = setup().await;

    let err = h
        .inbox
        .post_message("no-such-thread", AuthorRole::Buyer, "hello", Vec::new())
        .await
        .expect_err("missing thread");

    assert!(matches!(err, InboxError::ThreadNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn vendor_post_stamps_vendor_read_marker() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    h.clock.advance_secs(60);
    h.inbox
        .post_message(&thread.id, AuthorRole::Vendor, "welcome", Vec::new())
        .await
        .expect("post");

    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    assert_eq!(stored.vendor_last_read_at, Some(ts(2025, 6, 1, 10, 1)));
    assert!(stored.buyer_last_read_at.is_none());
}

#[tokio::test]
async fn buyer_post_leaves_vendor_marker_alone() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "question", Vec::new())
        .await
        .expect("post");

    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    assert!(stored.vendor_last_read_at.is_none());
}

#[tokio::test]
async fn editing_the_newest_message_updates_snapshot() {
    let h = setup().await;
    let buyer = Caller::buyer("U1");
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    let message = h
        .inbox
        .buyer_post(&buyer, &thread.id, "helo", Vec::new())
        .await
        .expect("post");

    h.clock.advance_secs(5);
    let edited = h
        .inbox
        .edit_message(&buyer, message.id, "hello")
        .await
        .expect("edit");

    assert_eq!(edited.body, "hello");
    assert!(edited.edited_at.is_some());
    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    assert_eq!(stored.last_message.expect("snapshot").text, "hello");
}

#[tokio::test]
async fn deleting_the_newest_message_falls_back_to_previous() {
    let h = setup().await;
    let vendor = Caller::vendor("staff", "V1");
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "first", Vec::new())
        .await
        .expect("post");
    h.clock.advance_secs(10);
    let reply = h
        .inbox
        .vendor_reply(&vendor, &thread.id, "oops", Vec::new())
        .await
        .expect("reply");

    h.inbox
        .delete_message(&vendor, reply.id)
        .await
        .expect("delete");

    let stored = load_thread(h.pool(), &thread.id).await.expect("load");
    let last = stored.last_message.expect("snapshot");
    assert_eq!(last.text, "first");
    assert_eq!(last.at, ts(2025, 6, 1, 10, 0));
    assert_eq!(count(h.pool(), "messages").await, 1);
}

#[tokio::test]
async fn only_the_author_side_may_edit() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    let message = h
        .inbox
        .post_message(&thread.id, AuthorRole::Buyer, "mine", Vec::new())
        .await
        .expect("post");

    let vendor = Caller::vendor("staff", "V1");
    let err = h
        .inbox
        .edit_message(&vendor, message.id, "theirs")
        .await
        .expect_err("vendor did not write it");
    assert!(matches!(err, InboxError::MessageNotFound(_)));

    let stranger = Caller::buyer("U2");
    let err = h
        .inbox
        .delete_message(&stranger, message.id)
        .await
        .expect_err("stranger");
    assert!(matches!(err, InboxError::MessageNotFound(_)));
    assert_eq!(count(h.pool(), "messages").await, 1);
}

#[tokio::test]
async fn deleting_a_thread_removes_its_messages() {
    let h = setup().await;
    let vendor = Caller::vendor("staff", "V1");
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "bye", Vec::new())
        .await
        .expect("post");

    h.inbox
        .vendor_delete_thread(&vendor, &thread.id)
        .await
        .expect("delete");

    assert_eq!(count(h.pool(), "threads").await, 0);
    assert_eq!(count(h.pool(), "messages").await, 0);
}

#[tokio::test]
async fn listing_a_missing_thread_fails() {
    let h = setup().await;

    let err = h
        .inbox
        .list_messages("missing")
        .await
        .expect_err("missing thread");
    assert!(matches!(err, InboxError::ThreadNotFound(_)));
}

#[tokio::test]
async fn archiving_keeps_messages() {
    let h = setup().await;
    let vendor = Caller::vendor("staff", "V1");
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "keep me", Vec::new())
        .await
        .expect("post");

    h.inbox
        .vendor_set_archived(&vendor, &thread.id, true)
        .await
        .expect("archive");
    h.inbox
        .vendor_set_archived(&vendor, &thread.id, false)
        .await
        .expect("unarchive");

    let listed = h.inbox.list_messages(&thread.id).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed.first().expect("message").body, "keep me");
}

#[tokio::test]
async fn appending_to_a_vanished_thread_is_not_found() {
    let h = setup().await;
    let err = messages::append(
        h.pool(),
        &NewMessage {
            thread_id: "deleted-meanwhile".to_owned(),
            author_role: AuthorRole::Buyer,
            author_display_name: None,
            body: "hello?".to_owned(),
            attachments: Vec::new(),
            created_at: ts(2025, 6, 1, 10, 0),
        },
    )
    .await
    .expect_err("foreign key should reject the message");

    assert!(matches!(err, InboxError::ThreadNotFound(ref id) if id == "deleted-meanwhile"));
    assert_eq!(count(h.pool(), "messages").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_posts_from_two_instances_all_land() {
    const WRITERS: usize = 8;
    const ROUNDS: usize = 25;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("busy.db");
    // Two service instances, each with its own pool over the same WAL file.
    let pool_a = leadbox::db::open(&path, 8).await.expect("open db");
    let pool_b = leadbox::db::open(&path, 8).await.expect("open db");
    let a = Arc::new(Inbox::new(pool_a.clone()));
    let b = Arc::new(Inbox::new(pool_b.clone()));

    let thread = a
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let inbox = if writer % 2 == 0 { a.clone() } else { b.clone() };
        let thread_id = thread.id.clone();
        let role = if writer % 2 == 0 {
            AuthorRole::Vendor
        } else {
            AuthorRole::Buyer
        };
        handles.push(tokio::spawn(async move {
            let mut failures = Vec::new();
            for round in 0..ROUNDS {
                let body = format!("writer {writer} round {round}");
                if let Err(err) = inbox.post_message(&thread_id, role, &body, Vec::new()).await {
                    failures.push(err.to_string());
                }
            }
            failures
        }));
    }

    let mut failures = Vec::new();
    for handle in handles {
        failures.extend(handle.await.expect("writer should not panic"));
    }
    assert!(failures.is_empty(), "posts failed: {failures:?}");

    let total = WRITERS.checked_mul(ROUNDS).expect("small count");
    let total = i64::try_from(total).expect("small count");
    assert_eq!(count(&pool_a, "messages").await, total);

    let stored = load_thread(&pool_b, &thread.id).await.expect("thread");
    let newest = messages::list_messages(&pool_b, &thread.id)
        .await
        .expect("list")
        .into_iter()
        .max_by_key(|m| (m.created_at, m.id))
        .expect("messages exist");
    assert_eq!(
        stored.last_message.map(|l| l.at),
        Some(newest.created_at),
        "snapshot must track the newest message"
    );

    pool_a.close().await;
    pool_b.close().await;
}

#[tokio::test]
async fn corrupt_attachment_json_is_reported() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "see file", vec![photo()])
        .await
        .expect("post");

    sqlx::query("UPDATE messages SET attachments = '{not json'")
        .execute(h.pool())
        .await
        .expect("corrupt row");

    let err = h
        .inbox
        .list_messages(&thread.id)
        .await
        .expect_err("corrupt attachments");
    assert!(matches!(err, InboxError::CorruptRow { field: "attachments", .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn corrupt_edit_time_is_reported() {
    let h = setup().await;
    let thread = h
        .inbox
        .ensure_thread("V1", &Counterpart::buyer("U1"), None)
        .await
        .expect("thread");
    h.inbox
        .post_message(&thread.id, AuthorRole::Buyer, "hello", Vec::new())
        .await
        .expect("post");

    sqlx::query("UPDATE messages SET edited_at = 'yesterday-ish'")
        .execute(h.pool())
        .await
        .expect("corrupt row");

    let err = h
        .inbox
        .list_messages(&thread.id)
        .await
        .expect_err("corrupt edited_at");
    assert!(
        matches!(err, InboxError::CorruptRow { field: "edited_at", ref value } if value == "yesterday-ish")
    );
}
