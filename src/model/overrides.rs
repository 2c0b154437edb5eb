//! Time-boxed drift overrides.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::field::Origin;
use super::severity::ChangeType;

/// Wildcard `change_type` matching every change.
pub const ANY_CHANGE: &str = "*";

/// Temporary acknowledgement of a known drift.
///
/// Active while the current UTC date is on or before `expires`. An expired
/// override is inert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// Field the override applies to.
    pub field_id: String,
    /// Change type name or `*`.
    pub change_type: String,
    /// Last day (UTC) the override is active.
    pub expires: NaiveDate,
    /// Why the drift is acceptable.
    pub reason: String,
    /// Tracking ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    /// Declaration site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl Override {
    /// Returns `true` when `today` is on or before the expiry date.
    #[must_use]
    pub fn is_active(&self, today: NaiveDate) -> bool {
        today <= self.expires
    }

    /// Returns `true` when this override covers the given field and change.
    #[must_use]
    pub fn matches(&self, field_id: &str, change_type: ChangeType) -> bool {
        self.field_id == field_id
            && (self.change_type == ANY_CHANGE || self.change_type == change_type.as_str())
    }

    /// Returns `true` when the named override key carries a value.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        match key {
            "field_id" | "change_type" | "expires" | "reason" => true,
            "ticket" => self.ticket.as_deref().is_some_and(|t| !t.trim().is_empty()),
            _ => false,
        }
    }
}
