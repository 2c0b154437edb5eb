//! Environment-driven settings.
//!
//! The binary loads `.env` through `dotenvy` before reading these. CLI
//! flags override every value here.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::LineageError;
use crate::model::{EnforcementMode, Severity, Threshold};

/// Default traversal bound for escalation chains.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Run settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `LINEAGE_FAIL_ON`: gate threshold.
    pub fail_on: Threshold,
    /// `LINEAGE_MODE`: block or warn.
    pub mode: EnforcementMode,
    /// `LINEAGE_MAX_DEPTH`: escalation depth bound.
    pub max_depth: usize,
    /// `LINEAGE_POLICY_DIR`: directory holding `<policy_id>.yaml` packs.
    pub policy_dir: PathBuf,
    /// `LINEAGE_TODAY`: pinned UTC date for override expiry.
    pub today: Option<NaiveDate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fail_on: Threshold::AtLeast(Severity::High),
            mode: EnforcementMode::Block,
            max_depth: DEFAULT_MAX_DEPTH,
            policy_dir: PathBuf::from("."),
            today: None,
        }
    }
}

impl Settings {
    /// Reads settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::InvalidValue`] for any unparseable variable.
    pub fn from_env() -> Result<Self, LineageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::InvalidValue`] for any unparseable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LineageError> {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("LINEAGE_FAIL_ON") {
            settings.fail_on = raw.parse()?;
        }
        if let Some(raw) = get("LINEAGE_MODE") {
            settings.mode = raw.parse()?;
        }
        if let Some(raw) = get("LINEAGE_MAX_DEPTH") {
            settings.max_depth = raw.parse().map_err(|_| {
                LineageError::invalid("LINEAGE_MAX_DEPTH", &raw, "a non-negative integer")
            })?;
        }
        if let Some(raw) = get("LINEAGE_POLICY_DIR") {
            settings.policy_dir = PathBuf::from(raw);
        }
        if let Some(raw) = get("LINEAGE_TODAY") {
            settings.today = Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| LineageError::invalid("LINEAGE_TODAY", &raw, "YYYY-MM-DD"))?,
            );
        }
        tracing::debug!(?settings, "resolved settings");
        Ok(settings)
    }
}
