//! The [`Inbox`] service: the operations exposed to vendors, buyers and
//! guests, with ownership checks in front of the repositories.
//!
//! Methods without a caller (`ensure_thread`, `post_message`, `mark_read`,
//! ...) are the trusted core operations. The `vendor_*`, `buyer_*` and
//! [`Inbox::contact`] methods take the request's [`Caller`] and reject
//! threads the caller does not own with the same `ThreadNotFound` an absent
//! thread produces.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::grouping::{self, InboxItem, ListQuery, PageLimits, Scope, ThreadSummary};
use super::lead::{self, parse_event_date, LeadPatch};
use super::lifecycle;
use super::messages::{self, NewMessage};
use super::model::{
    Attachment, AuthorRole, ContactInfo, Counterpart, Lead, Message, Side, Thread,
};
use super::planning::{self, PlanningEntry};
use super::read_state;
use super::threads;
use super::InboxError;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, InboxConfig, NotificationConfig};
use crate::identity::Caller;
use crate::notify::{self, LogNotifier, Notice, NoticeKind, Notifier};
use crate::orders::{OrderDirectory, SqliteOrderDirectory};

/// A message posted through the public contact form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContactForm {
    /// Vendor being contacted.
    pub vendor_id: String,
    /// Sender name.
    pub name: Option<String>,
    /// Sender email.
    pub email: Option<String>,
    /// Sender phone.
    pub phone: Option<String>,
    /// Message text.
    pub message: String,
    /// Attachment references.
    pub attachments: Vec<Attachment>,
    /// Planned event date (`YYYY-MM-DD`).
    pub event_date: Option<String>,
    /// Planned event type.
    pub event_type: Option<String>,
    /// Planned event location.
    pub event_location: Option<String>,
}

/// Result of a post that may have created its thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posted {
    /// The thread as it was before the message was appended.
    pub thread: Thread,
    /// The stored message.
    pub message: Message,
}

/// Inbox service over a SQLite pool and its collaborators.
pub struct Inbox {
    db: SqlitePool,
    orders: Arc<dyn OrderDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    limits: InboxConfig,
    notifications: NotificationConfig,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("limits", &self.limits)
            .field("notifications", &self.notifications.enabled)
            .finish_non_exhaustive()
    }
}

impl Inbox {
    /// Inbox over `db` with orders read from the same database, log-only
    /// notices, the system clock and default limits.
    pub fn new(db: SqlitePool) -> Self {
        Self {
            orders: Arc::new(SqliteOrderDirectory::new(db.clone())),
            db,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            limits: InboxConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    /// Apply limits and notification settings from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.limits = config.inbox.clone();
        self.notifications = config.notifications.clone();
        self
    }

    /// Replace the order directory.
    #[must_use]
    pub fn with_orders(mut self, orders: Arc<dyn OrderDirectory>) -> Self {
        self.orders = orders;
        self
    }

    /// Replace the notice delivery collaborator.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn page_limits(&self) -> PageLimits {
        PageLimits {
            default: self.limits.default_page_size,
            max: self.limits.max_page_size,
        }
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Find or create the thread of `(vendor_id, counterpart, order_id)`.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::ensure_thread`].
    pub async fn ensure_thread(
        &self,
        vendor_id: &str,
        counterpart: &Counterpart,
        order_id: Option<&str>,
    ) -> Result<Thread, InboxError> {
        lifecycle::ensure_thread(
            &self.db,
            self.orders.as_ref(),
            vendor_id,
            counterpart,
            order_id,
            Lead::default(),
            self.clock.now(),
        )
        .await
    }

    /// Append a message to a thread.
    ///
    /// Updates the thread snapshot, stamps the vendor read marker on vendor
    /// posts and notifies the other party without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::EmptyMessage`] or [`InboxError::InvalidAttachment`]
    /// for bad input, [`InboxError::ThreadNotFound`] if the thread does not
    /// exist, or [`InboxError::Database`] on SQLite failure.
    pub async fn post_message(
        &self,
        thread_id: &str,
        author_role: AuthorRole,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message, InboxError> {
        let thread = threads::load_thread(&self.db, thread_id).await?;
        self.append(&thread, author_role, None, body, attachments)
            .await
    }

    async fn append(
        &self,
        thread: &Thread,
        author_role: AuthorRole,
        author_display_name: Option<String>,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message, InboxError> {
        messages::validate_attachments(&attachments)?;
        let body = messages::prepare_body(body, &attachments)?;
        let display_name = match author_role {
            AuthorRole::Visitor => author_display_name,
            AuthorRole::Vendor | AuthorRole::Buyer => None,
        };

        let message = messages::append(
            &self.db,
            &NewMessage {
                thread_id: thread.id.clone(),
                author_role,
                author_display_name: display_name,
                body,
                attachments,
                created_at: self.clock.now(),
            },
        )
        .await?;

        self.notify_counterparty(thread, &message);
        Ok(message)
    }

    /// Fire-and-forget notice to whoever did not write `message`.
    fn notify_counterparty(&self, thread: &Thread, message: &Message) {
        if !self.notifications.enabled {
            return;
        }
        let (recipient, title, link) = match message.author_role {
            AuthorRole::Vendor => match thread.counterpart.buyer_user_id() {
                Some(user_id) => (
                    user_id.to_owned(),
                    "New reply from the vendor".to_owned(),
                    format!("{}{}", self.notifications.buyer_link_base, thread.id),
                ),
                None => {
                    debug!(thread_id = %thread.id, "anonymous counterpart; no notice sent");
                    return;
                }
            },
            AuthorRole::Buyer | AuthorRole::Visitor => {
                let from = message
                    .author_display_name
                    .clone()
                    .unwrap_or_else(|| thread.counterpart.display_name());
                (
                    thread.vendor_id.clone(),
                    format!("New message from {from}"),
                    format!("{}{}", self.notifications.vendor_link_base, thread.id),
                )
            }
        };

        let notice = Notice {
            kind: NoticeKind::NewMessage,
            title,
            body: notify::preview(&message.body),
            link,
        };
        drop(notify::dispatch(Arc::clone(&self.notifier), recipient, notice));
    }

    /// Messages of a thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::ThreadNotFound`] if the thread does not exist,
    /// or [`InboxError::Database`] on SQLite failure.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, InboxError> {
        threads::load_thread(&self.db, thread_id).await?;
        messages::list_messages(&self.db, thread_id).await
    }

    /// Mark a thread read for `role`'s side.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::ThreadNotFound`] if the thread does not exist,
    /// or [`InboxError::Database`] on SQLite failure.
    pub async fn mark_read(&self, thread_id: &str, role: AuthorRole) -> Result<(), InboxError> {
        read_state::mark_read(&self.db, thread_id, role.side(), self.clock.now()).await
    }

    /// Unread messages of a thread for `role`'s side.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::ThreadNotFound`] if the thread does not exist,
    /// or [`InboxError::Database`] on SQLite failure.
    pub async fn unread_count_for(
        &self,
        thread_id: &str,
        role: AuthorRole,
    ) -> Result<u64, InboxError> {
        let thread = threads::load_thread(&self.db, thread_id).await?;
        read_state::unread_count_for(&self.db, &thread.id, role.side()).await
    }

    /// Patch a thread's lead metadata, all or nothing.
    ///
    /// # Errors
    ///
    /// See [`lead::update_meta`].
    pub async fn update_meta(
        &self,
        thread_id: &str,
        patch: LeadPatch,
    ) -> Result<Thread, InboxError> {
        lead::update_meta(&self.db, thread_id, patch, self.clock.now()).await
    }

    /// A vendor's inbox view.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Database`] if the thread query fails.
    pub async fn list_threads(
        &self,
        vendor_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<InboxItem>, InboxError> {
        grouping::list_threads(
            &self.db,
            vendor_id,
            query,
            self.clock.today(),
            self.limits.upcoming_window_days,
            self.page_limits(),
        )
        .await
    }

    /// Leads with an event in `[from, to]`; defaults to the configured
    /// window starting today.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Database`] on SQLite failure.
    pub async fn list_upcoming_leads(
        &self,
        vendor_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PlanningEntry>, InboxError> {
        let (from, to) = planning::resolve_window(
            from,
            to,
            self.clock.today(),
            self.limits.planning_window_days,
        );
        planning::list_upcoming_leads(&self.db, vendor_id, from, to).await
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    async fn vendor_owned(&self, vendor_id: &str, thread_id: &str) -> Result<Thread, InboxError> {
        let thread = threads::load_thread(&self.db, thread_id).await?;
        if thread.vendor_id != vendor_id {
            return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
        }
        Ok(thread)
    }

    async fn buyer_owned(&self, user_id: &str, thread_id: &str) -> Result<Thread, InboxError> {
        let thread = threads::load_thread(&self.db, thread_id).await?;
        if thread.counterpart.buyer_user_id() != Some(user_id) {
            return Err(InboxError::ThreadNotFound(thread_id.to_owned()));
        }
        Ok(thread)
    }

    /// The side `caller` speaks for in `thread`, if any.
    fn caller_side(caller: &Caller, thread: &Thread) -> Option<Side> {
        if caller.vendor_id.as_deref() == Some(thread.vendor_id.as_str()) {
            return Some(Side::Vendor);
        }
        match (caller.require_buyer().ok(), thread.counterpart.buyer_user_id()) {
            (Some(caller_id), Some(buyer_id)) if caller_id == buyer_id => Some(Side::Counterpart),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Vendor-facing
    // -----------------------------------------------------------------------

    /// List the caller's vendor inbox.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] without a vendor binding, or any
    /// error of [`Inbox::list_threads`].
    pub async fn vendor_threads(
        &self,
        caller: &Caller,
        query: &ListQuery,
    ) -> Result<Vec<InboxItem>, InboxError> {
        let vendor_id = caller.require_vendor()?;
        self.list_threads(vendor_id, query).await
    }

    /// One thread of the caller's vendor with its unread count.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn vendor_thread(
        &self,
        caller: &Caller,
        thread_id: &str,
    ) -> Result<ThreadSummary, InboxError> {
        let thread = self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        let unread = read_state::unread_count_for(&self.db, thread_id, Side::Vendor)
            .await
            .unwrap_or_else(|err| {
                warn!(thread_id, error = %err, "unread computation failed; reporting zero");
                0
            });
        Ok(ThreadSummary {
            display_name: thread.counterpart.display_name(),
            last_at: thread.last_at(),
            thread,
            unread_count: unread,
        })
    }

    /// Messages of a vendor thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn vendor_messages(
        &self,
        caller: &Caller,
        thread_id: &str,
    ) -> Result<Vec<Message>, InboxError> {
        self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        messages::list_messages(&self.db, thread_id).await
    }

    /// Post a vendor reply.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`], [`InboxError::ThreadNotFound`] or
    /// any error of [`Inbox::post_message`].
    pub async fn vendor_reply(
        &self,
        caller: &Caller,
        thread_id: &str,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message, InboxError> {
        let thread = self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        self.append(&thread, AuthorRole::Vendor, None, body, attachments)
            .await
    }

    /// Mark a vendor thread read.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn vendor_mark_read(&self, caller: &Caller, thread_id: &str) -> Result<(), InboxError> {
        self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        self.mark_read(thread_id, AuthorRole::Vendor).await
    }

    /// Archive or unarchive a thread in the vendor inbox.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn vendor_set_archived(
        &self,
        caller: &Caller,
        thread_id: &str,
        archived: bool,
    ) -> Result<(), InboxError> {
        self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        threads::set_archived(&self.db, thread_id, Side::Vendor, archived, self.clock.now()).await
    }

    /// Patch lead metadata of a vendor thread.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`], [`InboxError::ThreadNotFound`] or
    /// any error of [`Inbox::update_meta`].
    pub async fn vendor_update_meta(
        &self,
        caller: &Caller,
        thread_id: &str,
        patch: LeadPatch,
    ) -> Result<Thread, InboxError> {
        self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        self.update_meta(thread_id, patch).await
    }

    /// Planning view of the caller's vendor.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::Database`].
    pub async fn vendor_planning(
        &self,
        caller: &Caller,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PlanningEntry>, InboxError> {
        let vendor_id = caller.require_vendor()?;
        self.list_upcoming_leads(vendor_id, from, to).await
    }

    /// Open (or reuse) the thread about one of the vendor's orders.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`], or any error of
    /// [`lifecycle::ensure_thread_for_order`].
    pub async fn vendor_ensure_order_thread(
        &self,
        caller: &Caller,
        order_id: &str,
    ) -> Result<Thread, InboxError> {
        let vendor_id = caller.require_vendor()?;
        lifecycle::ensure_thread_for_order(
            &self.db,
            self.orders.as_ref(),
            vendor_id,
            order_id,
            self.clock.now(),
        )
        .await
    }

    /// Unread badge across the vendor's active threads. Degrades to zero.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] without a vendor binding.
    pub async fn vendor_unread_badge(&self, caller: &Caller) -> Result<u64, InboxError> {
        let vendor_id = caller.require_vendor()?;
        Ok(read_state::vendor_badge(&self.db, vendor_id)
            .await
            .unwrap_or_else(|err| {
                warn!(vendor_id, error = %err, "unread badge failed; reporting zero");
                0
            }))
    }

    /// Delete a vendor thread and all its messages.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn vendor_delete_thread(&self, caller: &Caller, thread_id: &str) -> Result<(), InboxError> {
        self.vendor_owned(caller.require_vendor()?, thread_id).await?;
        threads::delete_thread(&self.db, thread_id).await?;
        info!(thread_id, "thread deleted by vendor");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Buyer-facing
    // -----------------------------------------------------------------------

    /// The caller's own threads.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] for anonymous callers.
    pub async fn buyer_threads(
        &self,
        caller: &Caller,
        scope: Scope,
    ) -> Result<Vec<ThreadSummary>, InboxError> {
        let user_id = caller.require_buyer()?;
        grouping::list_buyer_threads(&self.db, user_id, scope).await
    }

    /// Messages of one of the caller's threads.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn buyer_messages(
        &self,
        caller: &Caller,
        thread_id: &str,
    ) -> Result<Vec<Message>, InboxError> {
        self.buyer_owned(caller.require_buyer()?, thread_id).await?;
        messages::list_messages(&self.db, thread_id).await
    }

    /// Post into one of the caller's threads.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`], [`InboxError::ThreadNotFound`] or
    /// any error of [`Inbox::post_message`].
    pub async fn buyer_post(
        &self,
        caller: &Caller,
        thread_id: &str,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message, InboxError> {
        let thread = self.buyer_owned(caller.require_buyer()?, thread_id).await?;
        self.append(&thread, AuthorRole::Buyer, None, body, attachments)
            .await
    }

    /// Start (or continue) a conversation with a vendor, optionally about one
    /// of the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] for anonymous callers,
    /// [`InboxError::OrderNotFoundForVendor`] when the order is not the
    /// caller's order with that vendor, or any error of
    /// [`Inbox::post_message`].
    pub async fn buyer_inquiry(
        &self,
        caller: &Caller,
        vendor_id: &str,
        order_id: Option<&str>,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Posted, InboxError> {
        let user_id = caller.require_buyer()?;
        messages::validate_attachments(&attachments)?;
        messages::prepare_body(body, &attachments)?;

        if let Some(order_id) = order_id {
            let owned = self
                .orders
                .find_for_vendor(vendor_id, order_id)
                .await?
                .is_some_and(|order| order.buyer_user_id.as_deref() == Some(user_id));
            if !owned {
                return Err(InboxError::OrderNotFoundForVendor {
                    vendor_id: vendor_id.to_owned(),
                    order_id: order_id.to_owned(),
                });
            }
        }

        let counterpart = Counterpart::Buyer {
            user_id: user_id.to_owned(),
            name: caller.display_name.clone(),
        };
        let thread = self.ensure_thread(vendor_id, &counterpart, order_id).await?;
        let message = self
            .append(&thread, AuthorRole::Buyer, None, body, attachments)
            .await?;
        Ok(Posted { thread, message })
    }

    /// Mark one of the caller's threads read.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn buyer_mark_read(&self, caller: &Caller, thread_id: &str) -> Result<(), InboxError> {
        self.buyer_owned(caller.require_buyer()?, thread_id).await?;
        self.mark_read(thread_id, AuthorRole::Buyer).await
    }

    /// Archive or unarchive a thread in the caller's own inbox.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn buyer_set_archived(
        &self,
        caller: &Caller,
        thread_id: &str,
        archived: bool,
    ) -> Result<(), InboxError> {
        self.buyer_owned(caller.require_buyer()?, thread_id).await?;
        threads::set_archived(
            &self.db,
            thread_id,
            Side::Counterpart,
            archived,
            self.clock.now(),
        )
        .await
    }

    /// Delete one of the caller's threads and all its messages.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] or [`InboxError::ThreadNotFound`].
    pub async fn buyer_delete_thread(&self, caller: &Caller, thread_id: &str) -> Result<(), InboxError> {
        self.buyer_owned(caller.require_buyer()?, thread_id).await?;
        threads::delete_thread(&self.db, thread_id).await?;
        info!(thread_id, "thread deleted by buyer");
        Ok(())
    }

    /// Unread badge across the caller's active threads. Degrades to zero.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] for anonymous callers.
    pub async fn buyer_unread_badge(&self, caller: &Caller) -> Result<u64, InboxError> {
        let user_id = caller.require_buyer()?;
        Ok(read_state::buyer_badge(&self.db, user_id)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "unread badge failed; reporting zero");
                0
            }))
    }

    // -----------------------------------------------------------------------
    // Author edits
    // -----------------------------------------------------------------------

    /// Load a message the caller wrote, hiding everything else.
    async fn authored_message(
        &self,
        caller: &Caller,
        message_id: i64,
    ) -> Result<Message, InboxError> {
        let message = messages::load_message(&self.db, message_id).await?;
        let thread = threads::load_thread(&self.db, &message.thread_id)
            .await
            .map_err(|_| InboxError::MessageNotFound(message_id))?;
        let allowed = match Self::caller_side(caller, &thread) {
            Some(Side::Vendor) => message.author_role == AuthorRole::Vendor,
            Some(Side::Counterpart) => message.author_role == AuthorRole::Buyer,
            None => false,
        };
        if !allowed {
            return Err(InboxError::MessageNotFound(message_id));
        }
        Ok(message)
    }

    /// Replace the body of a message the caller wrote.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::MessageNotFound`] for messages the caller did not
    /// write, or [`InboxError::EmptyMessage`] for a blank body on a message
    /// without attachments.
    pub async fn edit_message(
        &self,
        caller: &Caller,
        message_id: i64,
        body: &str,
    ) -> Result<Message, InboxError> {
        let message = self.authored_message(caller, message_id).await?;
        let body = messages::prepare_body(body, &message.attachments)?;
        messages::update_body(&self.db, &message, &body, self.clock.now()).await
    }

    /// Delete a message the caller wrote.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::MessageNotFound`] for messages the caller did not
    /// write.
    pub async fn delete_message(&self, caller: &Caller, message_id: i64) -> Result<(), InboxError> {
        let message = self.authored_message(caller, message_id).await?;
        messages::delete(&self.db, &message, self.clock.now()).await
    }

    // -----------------------------------------------------------------------
    // Guest
    // -----------------------------------------------------------------------

    /// Create-or-append through the public contact form.
    ///
    /// A logged-in caller is identified by user id; anyone else by the form's
    /// email or phone. Repeat posts land in the same thread. Event fields seed
    /// the lead of a newly created thread only.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::MissingContact`] without user id, email or phone,
    /// [`InboxError::InvalidDate`] for a bad event date, or any error of
    /// [`Inbox::post_message`]. Nothing is written on validation failure.
    pub async fn contact(&self, caller: &Caller, form: ContactForm) -> Result<Posted, InboxError> {
        let vendor_id = form.vendor_id.trim();
        if vendor_id.is_empty() {
            return Err(InboxError::InvalidArgument {
                field: "vendorId",
                value: form.vendor_id.clone(),
            });
        }
        messages::validate_attachments(&form.attachments)?;
        messages::prepare_body(&form.message, &form.attachments)?;

        let info = ContactInfo {
            name: form.name.clone(),
            email: form.email.clone(),
            phone: form.phone.clone(),
        }
        .normalized();

        let (counterpart, role, display_name) = match caller.require_buyer().ok() {
            Some(user_id) => (
                Counterpart::Buyer {
                    user_id: user_id.to_owned(),
                    name: caller.display_name.clone().or_else(|| info.name.clone()),
                },
                AuthorRole::Buyer,
                None,
            ),
            None => {
                if info.email.is_none() && info.phone.is_none() {
                    return Err(InboxError::MissingContact);
                }
                let label = info
                    .name
                    .clone()
                    .or_else(|| info.email.clone())
                    .or_else(|| info.phone.clone());
                (Counterpart::Contact(info), AuthorRole::Visitor, label)
            }
        };

        let seed = Lead {
            event_date: form
                .event_date
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|raw| parse_event_date("eventDate", raw))
                .transpose()?,
            event_type: form.event_type.clone().filter(|s| !s.trim().is_empty()),
            event_location: form.event_location.clone().filter(|s| !s.trim().is_empty()),
            ..Lead::default()
        };

        let thread = lifecycle::ensure_thread(
            &self.db,
            self.orders.as_ref(),
            vendor_id,
            &counterpart,
            None,
            seed,
            self.clock.now(),
        )
        .await?;

        let message = self
            .append(&thread, role, display_name, &form.message, form.attachments)
            .await?;
        info!(thread_id = %thread.id, vendor_id, role = role.as_str(), "contact form message stored");
        Ok(Posted { thread, message })
    }
}
