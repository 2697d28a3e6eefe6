//! Vendor↔buyer inbox: threads, messages, read state, lead metadata and the
//! grouped inbox views built on top of them.
//!
//! # SQLite Write Pattern
//!
//! Every mutation is a single statement against the pool. Cross-instance
//! invariants (one thread per vendor/counterpart/order triple, read markers,
//! last-message snapshots) are enforced by unique indexes and atomic
//! `UPDATE`s, never by in-process locks, so any number of service instances
//! may share the database file.

pub mod grouping;
pub mod lead;
pub mod lifecycle;
pub mod messages;
pub mod model;
pub mod planning;
pub mod read_state;
pub mod service;
pub mod threads;

pub use model::{
    Attachment, AuthorRole, ContactInfo, Counterpart, LastMessage, Lead, LeadStatus, Message,
    Thread,
};
pub use service::Inbox;

/// Coarse classification of [`InboxError`] for transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Thread, message or order absent, or not owned by the caller.
    NotFound,
    /// Caller has no vendor or buyer binding.
    Forbidden,
    /// Input rejected before any mutation.
    Validation,
    /// Unique-constraint race that could not be resolved.
    Conflict,
    /// Storage failure or corrupt data.
    Internal,
}

/// Errors from inbox operations.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The thread does not exist or is not visible to the caller.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// The message does not exist or is not visible to the caller.
    #[error("message not found: {0}")]
    MessageNotFound(i64),

    /// An order id was given that the vendor does not own.
    #[error("order {order_id} not found for vendor {vendor_id}")]
    OrderNotFoundForVendor {
        /// Vendor the lookup was scoped to.
        vendor_id: String,
        /// Requested order.
        order_id: String,
    },

    /// The caller has no vendor or buyer binding for this operation.
    #[error("caller is not allowed to perform this operation")]
    Forbidden,

    /// Message body is blank and carries no attachments.
    #[error("message body is empty")]
    EmptyMessage,

    /// An anonymous counterpart has neither name, email nor phone.
    #[error("counterpart needs a user id, email, phone or name")]
    MissingContact,

    /// A date or timestamp field could not be parsed.
    #[error("invalid date for {field}: {value:?}")]
    InvalidDate {
        /// Offending field.
        field: &'static str,
        /// Raw input.
        value: String,
    },

    /// Unknown lead status.
    #[error("invalid lead status: {0:?}")]
    InvalidLeadStatus(String),

    /// A budget bound is negative or not a finite number.
    #[error("invalid {field}: {value}")]
    InvalidBudget {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// An attachment reference is unusable.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// A list filter or enum argument was not recognised.
    #[error("invalid {field} value: {value:?}")]
    InvalidArgument {
        /// Which argument contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// A stored row holds a value this version cannot decode.
    #[error("corrupt {field} value in storage: {value:?}")]
    CorruptRow {
        /// Column that failed to decode.
        field: &'static str,
        /// Stored value.
        value: String,
    },

    /// Thread creation raced and the winning row could not be re-read.
    #[error("conflicting thread for {0}; retry with the existing thread")]
    Conflict(String),
}

impl InboxError {
    /// Classify for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ThreadNotFound(_)
            | Self::MessageNotFound(_)
            | Self::OrderNotFoundForVendor { .. } => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::EmptyMessage
            | Self::MissingContact
            | Self::InvalidDate { .. }
            | Self::InvalidLeadStatus(_)
            | Self::InvalidBudget { .. }
            | Self::InvalidAttachment(_)
            | Self::InvalidArgument { .. } => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Database(_) | Self::CorruptRow { .. } => ErrorKind::Internal,
        }
    }
}
