//! Normalizes lineage override annotations.

use chrono::NaiveDate;

use super::field::FIELD_ID;
use super::record::RawRecord;
use super::{Diagnostic, DiagnosticCode};
use crate::model::{ChangeType, Override, ANY_CHANGE};

pub(super) fn normalize_override(record: &RawRecord) -> Result<Override, Vec<Diagnostic>> {
    let field_id = record
        .field_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| record.get("field_id"));
    let mut errors = Vec::new();

    match field_id {
        None => errors.push("override needs field_id".to_string()),
        Some(id) if !FIELD_ID.is_match(id) => {
            errors.push(format!("override field_id {id:?} does not match {}", FIELD_ID.as_str()));
        }
        Some(_) => {}
    }

    let change_type = match record.get("change_type") {
        Some(ANY_CHANGE) => Some(ANY_CHANGE.to_string()),
        Some(raw) => match ChangeType::parse(raw) {
            Some(ct) => Some(ct.as_str().to_string()),
            None => {
                errors.push(format!("override change_type {raw:?} is not a known change type or *"));
                None
            }
        },
        None => {
            errors.push("override needs change_type".to_string());
            None
        }
    };

    let expires = match record.get("expires") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| errors.push(format!("override expires {raw:?} is not YYYY-MM-DD")))
            .ok(),
        None => {
            errors.push("override needs expires".to_string());
            None
        }
    };

    let reason = record.get("reason");
    if reason.is_none() {
        errors.push("override needs reason".to_string());
    }

    match (field_id, change_type, expires, reason) {
        (Some(field_id), Some(change_type), Some(expires), Some(reason)) if errors.is_empty() => {
            Ok(Override {
                field_id: field_id.to_string(),
                change_type,
                expires,
                reason: reason.to_string(),
                ticket: record.get("ticket").map(str::to_string),
                origin: record.origin(),
            })
        }
        _ => Err(errors
            .into_iter()
            .map(|message| Diagnostic {
                field_id: field_id.map(str::to_string),
                origin: record.origin(),
                code: DiagnosticCode::InvalidOverride,
                message,
            })
            .collect()),
    }
}
