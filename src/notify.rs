//! New-message notices to the party that did not author the message.
//!
//! Delivery (e-mail, push, in-app) is someone else's job. The inbox hands a
//! [`Notice`] to a [`Notifier`] on a detached task and never waits for, or
//! fails on, the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Kind of notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A new message arrived in a thread.
    NewMessage,
}

/// Payload handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Notice kind.
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    /// Short headline.
    pub title: String,
    /// Preview text.
    pub body: String,
    /// Deep link into the inbox.
    pub link: String,
}

/// Errors reported by a [`Notifier`].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The delivery backend refused or failed.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivery collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notice` to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails. Callers log and drop it.
    async fn notify(&self, user_id: &str, notice: Notice) -> Result<(), NotifyError>;
}

/// [`Notifier`] that only records the notice in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, notice: Notice) -> Result<(), NotifyError> {
        info!(user_id, title = %notice.title, link = %notice.link, "notice emitted");
        Ok(())
    }
}

/// Maximum preview length carried in a notice body, in characters.
const PREVIEW_CHARS: usize = 140;

/// Truncate a message body for use as a notice preview.
pub fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Dispatch `notice` on a detached task.
///
/// The returned handle is only useful to callers that want to await
/// delivery (tests); the inbox drops it.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    user_id: String,
    notice: Notice,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(&user_id, notice).await {
            warn!(user_id = %user_id, error = %err, "notice delivery failed; dropped");
        }
    })
}
