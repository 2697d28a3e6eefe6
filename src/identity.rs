//! Caller identity as handed over by the authentication layer.
//!
//! Role detection (token claims, headers, account lookups) happens upstream
//! exactly once per request. The result is a [`Caller`], which this crate
//! trusts as-is and never re-derives.

use serde::{Deserialize, Serialize};

use crate::inbox::InboxError;

/// The resolved identity of whoever is invoking an inbox operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Registered user id, if the caller is logged in.
    pub user_id: Option<String>,
    /// Vendor the caller acts for, if any.
    pub vendor_id: Option<String>,
    /// Display name of the logged-in user, used to seed buyer threads.
    pub display_name: Option<String>,
}

impl Caller {
    /// A caller acting on behalf of a vendor.
    pub fn vendor(user_id: impl Into<String>, vendor_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            vendor_id: Some(vendor_id.into()),
            display_name: None,
        }
    }

    /// A registered buyer.
    pub fn buyer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            vendor_id: None,
            display_name: None,
        }
    }

    /// An anonymous visitor.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// The vendor binding, or [`InboxError::Forbidden`].
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] when the caller acts for no vendor.
    pub fn require_vendor(&self) -> Result<&str, InboxError> {
        bound(self.vendor_id.as_ref()).ok_or(InboxError::Forbidden)
    }

    /// The buyer user id, trimmed, or [`InboxError::Forbidden`].
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Forbidden`] for anonymous callers.
    pub fn require_buyer(&self) -> Result<&str, InboxError> {
        bound(self.user_id.as_ref()).ok_or(InboxError::Forbidden)
    }
}

/// A trimmed, non-blank binding.
fn bound(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
