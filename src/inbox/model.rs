//! Inbox domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::InboxError;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorRole {
    /// The vendor owning the thread.
    Vendor,
    /// A registered buyer.
    Buyer,
    /// An anonymous visitor writing through the contact form.
    Visitor,
}

impl AuthorRole {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "VENDOR",
            Self::Buyer => "BUYER",
            Self::Visitor => "VISITOR",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::CorruptRow`] if the value is not a known role.
    pub fn parse(s: &str) -> Result<Self, InboxError> {
        match s {
            "VENDOR" => Ok(Self::Vendor),
            "BUYER" => Ok(Self::Buyer),
            "VISITOR" => Ok(Self::Visitor),
            other => Err(InboxError::CorruptRow {
                field: "author_role",
                value: other.to_owned(),
            }),
        }
    }

    /// The side of the conversation this role speaks for.
    ///
    /// Buyers and visitors share the counterpart read marker.
    pub fn side(&self) -> Side {
        match self {
            Self::Vendor => Side::Vendor,
            Self::Buyer | Self::Visitor => Side::Counterpart,
        }
    }
}

/// One of the two parties of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The vendor.
    Vendor,
    /// The buyer or anonymous contact.
    Counterpart,
}

impl Side {
    /// Column holding this side's last-read timestamp.
    pub(crate) fn read_column(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor_last_read_at",
            Self::Counterpart => "buyer_last_read_at",
        }
    }

    /// Author roles whose messages count as unread for this side.
    pub(crate) fn foreign_roles(&self) -> &'static [&'static str] {
        match self {
            Self::Vendor => &["BUYER", "VISITOR"],
            Self::Counterpart => &["VENDOR"],
        }
    }
}

// ---------------------------------------------------------------------------
// Lead status
// ---------------------------------------------------------------------------

/// Sales-funnel position of a thread.
///
/// Advisory only: any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    /// Fresh inquiry.
    New,
    /// Conversation ongoing.
    InDiscussion,
    /// Vendor sent a quote.
    OfferSent,
    /// Booked.
    Reserved,
    /// Gone elsewhere.
    Lost,
}

/// Storage code and UI label for every status.
const LEAD_STATUS_TABLE: [(LeadStatus, &str, &str); 5] = [
    (LeadStatus::New, "NEW", "New"),
    (LeadStatus::InDiscussion, "IN_DISCUSSION", "In discussion"),
    (LeadStatus::OfferSent, "OFFER_SENT", "Offer sent"),
    (LeadStatus::Reserved, "RESERVED", "Reserved"),
    (LeadStatus::Lost, "LOST", "Lost"),
];

impl LeadStatus {
    /// All statuses in funnel order.
    pub fn all() -> impl Iterator<Item = LeadStatus> {
        LEAD_STATUS_TABLE.iter().map(|(status, _, _)| *status)
    }

    fn entry(&self) -> &'static (LeadStatus, &'static str, &'static str) {
        // Every variant has a row; the fallback is unreachable.
        LEAD_STATUS_TABLE
            .iter()
            .find(|(status, _, _)| status == self)
            .unwrap_or(&LEAD_STATUS_TABLE[0])
    }

    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        self.entry().1
    }

    /// Human-facing label.
    pub fn label(&self) -> &'static str {
        self.entry().2
    }

    /// Parse a storage code (any case, `-` or `_` separated) or a UI label.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::InvalidLeadStatus`] for anything else.
    pub fn parse(s: &str) -> Result<Self, InboxError> {
        let trimmed = s.trim();
        let code = trimmed.to_ascii_uppercase().replace(['-', ' '], "_");
        LEAD_STATUS_TABLE
            .iter()
            .find(|(_, stored, label)| *stored == code || label.eq_ignore_ascii_case(trimmed))
            .map(|(status, _, _)| *status)
            .ok_or_else(|| InboxError::InvalidLeadStatus(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Counterpart
// ---------------------------------------------------------------------------

/// Contact fields of an anonymous counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Name as typed in the contact form.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Trim every field and drop the blank ones.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        }
        Self {
            name: clean(&self.name),
            email: clean(&self.email),
            phone: clean(&self.phone),
        }
    }

    /// `true` when no identifying field is present.
    pub fn is_empty(&self) -> bool {
        let n = self.normalized();
        n.name.is_none() && n.email.is_none() && n.phone.is_none()
    }

    /// Fill blank fields from `other`, keeping the ones already present.
    #[must_use]
    pub fn or(self, other: &ContactInfo) -> Self {
        let other = other.normalized();
        let this = self.normalized();
        Self {
            name: this.name.or(other.name),
            email: this.email.or(other.email),
            phone: this.phone.or(other.phone),
        }
    }
}

/// The non-vendor party of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Counterpart {
    /// A registered buyer.
    Buyer {
        /// Buyer user id.
        user_id: String,
        /// Display name known at thread creation.
        name: Option<String>,
    },
    /// An anonymous contact.
    Contact(ContactInfo),
}

impl Counterpart {
    /// A registered buyer without a known display name.
    pub fn buyer(user_id: impl Into<String>) -> Self {
        Self::Buyer {
            user_id: user_id.into().trim().to_owned(),
            name: None,
        }
    }

    /// An anonymous contact identified by email.
    pub fn email(email: impl Into<String>) -> Self {
        Self::Contact(ContactInfo {
            email: Some(email.into()),
            ..ContactInfo::default()
        })
    }

    /// Trimmed copy: the buyer id and every contact field lose surrounding
    /// whitespace, blank optional fields become `None`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Buyer { user_id, name } => Self::Buyer {
                user_id: user_id.trim().to_owned(),
                name: name
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
            },
            Self::Contact(info) => Self::Contact(info.normalized()),
        }
    }

    /// Storage identity used by the thread uniqueness constraint.
    ///
    /// Anonymous contacts key on the first present of email, phone, name.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::MissingContact`] for an empty buyer id or a
    /// contact without any identifying field.
    pub fn key(&self) -> Result<String, InboxError> {
        match self {
            Self::Buyer { user_id, .. } => {
                let id = user_id.trim();
                if id.is_empty() {
                    return Err(InboxError::MissingContact);
                }
                Ok(format!("buyer:{id}"))
            }
            Self::Contact(info) => {
                if let Some(email) = self.email_key() {
                    return Ok(format!("email:{email}"));
                }
                if let Some(phone) = self.phone_key() {
                    return Ok(format!("phone:{phone}"));
                }
                match info.normalized().name {
                    Some(name) => Ok(format!("name:{}", name.to_lowercase())),
                    None => Err(InboxError::MissingContact),
                }
            }
        }
    }

    /// Lowercased email of an anonymous contact.
    pub fn email_key(&self) -> Option<String> {
        match self {
            Self::Contact(info) => info.normalized().email.map(|e| e.to_lowercase()),
            Self::Buyer { .. } => None,
        }
    }

    /// Digits (and leading `+`) of an anonymous contact's phone.
    pub fn phone_key(&self) -> Option<String> {
        match self {
            Self::Contact(info) => info.normalized().phone.as_deref().and_then(normalize_phone),
            Self::Buyer { .. } => None,
        }
    }

    /// Registered buyer id, if any.
    pub fn buyer_user_id(&self) -> Option<&str> {
        match self {
            Self::Buyer { user_id, .. } => Some(user_id),
            Self::Contact(_) => None,
        }
    }

    /// Best label for inbox display.
    pub fn display_name(&self) -> String {
        match self {
            Self::Buyer { user_id, name } => name.clone().unwrap_or_else(|| user_id.clone()),
            Self::Contact(info) => {
                let info = info.normalized();
                info.name
                    .or(info.email)
                    .or(info.phone)
                    .unwrap_or_default()
            }
        }
    }
}

/// Keep digits and a leading `+`; `None` when no digit remains.
fn normalize_phone(raw: &str) -> Option<String> {
    let plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(if plus { format!("+{digits}") } else { digits })
}

// ---------------------------------------------------------------------------
// Thread & message
// ---------------------------------------------------------------------------

/// Reference to a file held by the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Absolute URL of the stored file.
    pub url: String,
    /// Original file name.
    pub filename: String,
    /// MIME type.
    pub mime: String,
}

/// Denormalized copy of a thread's newest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Message body.
    pub text: String,
    /// Message timestamp.
    pub at: DateTime<Utc>,
}

/// Funnel metadata carried by a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Funnel position.
    pub status: LeadStatus,
    /// Free-form labels, deduplicated and sorted.
    pub tags: BTreeSet<String>,
    /// When the vendor wants to follow up.
    pub follow_up_at: Option<DateTime<Utc>>,
    /// Vendor-only note.
    pub internal_note: Option<String>,
    /// Date of the event being planned.
    pub event_date: Option<NaiveDate>,
    /// Kind of event (wedding, corporate, ...).
    pub event_type: Option<String>,
    /// Where the event takes place.
    pub event_location: Option<String>,
    /// Lower budget bound.
    pub budget_min: Option<f64>,
    /// Upper budget bound.
    pub budget_max: Option<f64>,
}

impl Default for Lead {
    fn default() -> Self {
        Self {
            status: LeadStatus::New,
            tags: BTreeSet::new(),
            follow_up_at: None,
            internal_note: None,
            event_date: None,
            event_type: None,
            event_location: None,
            budget_min: None,
            budget_max: None,
        }
    }
}

/// A conversation between a vendor and one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread id (UUID).
    pub id: String,
    /// Owning vendor.
    pub vendor_id: String,
    /// The other party.
    pub counterpart: Counterpart,
    /// Order the conversation is about, if any.
    pub order_id: Option<String>,
    /// Snapshot of the newest message.
    pub last_message: Option<LastMessage>,
    /// Vendor read marker.
    pub vendor_last_read_at: Option<DateTime<Utc>>,
    /// Buyer/visitor read marker.
    pub buyer_last_read_at: Option<DateTime<Utc>>,
    /// Hidden from the vendor's active inbox.
    pub archived: bool,
    /// Hidden from the buyer's active inbox.
    pub buyer_archived: bool,
    /// Funnel metadata.
    pub lead: Lead,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Time of the newest message, or creation time for an empty thread.
    pub fn last_at(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map_or(self.created_at, |last| last.at)
    }
}

/// One message in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Insertion id; breaks `created_at` ties.
    pub id: i64,
    /// Owning thread.
    pub thread_id: String,
    /// Author role.
    pub author_role: AuthorRole,
    /// Visitor-supplied name (visitors only).
    pub author_display_name: Option<String>,
    /// Text body.
    pub body: String,
    /// File references.
    pub attachments: Vec<Attachment>,
    /// Post time.
    pub created_at: DateTime<Utc>,
    /// Last edit time.
    pub edited_at: Option<DateTime<Utc>>,
}
