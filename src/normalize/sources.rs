//! Source reference grammar.
//!
//! ```text
//! kind:target#path[@scope[!as_of]][?contract_ref=..&provider_id=..&upstream_system=..]
//! ```
//!
//! Multiple refs are comma-separated.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{Source, SourceKind, SourceScope, SystemId};

/// Parses every comma-separated ref, collecting one message per bad ref.
///
/// # Errors
///
/// Returns every parse failure; valid refs are discarded in that case.
pub fn parse_sources(raw: &str, field_system: &SystemId) -> Result<Vec<Source>, Vec<String>> {
    let mut sources = Vec::new();
    let mut errors = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_source(item, field_system) {
            Ok(source) => sources.push(source),
            Err(err) => errors.push(format!("source {item:?}: {err}")),
        }
    }
    if errors.is_empty() {
        Ok(sources)
    } else {
        Err(errors)
    }
}

/// Parses one source ref.
///
/// # Errors
///
/// Returns a message describing the first grammar or consistency violation.
pub fn parse_source(raw: &str, field_system: &SystemId) -> Result<Source, String> {
    let (head, query) = match raw.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (raw, None),
    };
    let (kind_raw, rest) = head.split_once(':').ok_or("expected kind:target#path")?;
    let kind = SourceKind::parse(kind_raw).ok_or_else(|| {
        format!("unknown kind {kind_raw:?} (valid: {})", SourceKind::VALUES.join("|"))
    })?;
    let (target, rest) = rest.split_once('#').ok_or("missing #path")?;
    let (path, scope_part) = match rest.split_once('@') {
        Some((path, scope)) => (path, Some(scope)),
        None => (rest, None),
    };
    let target = target.trim();
    let path = path.trim();
    if target.is_empty() {
        return Err("empty target".to_string());
    }
    if path.is_empty() {
        return Err("empty path".to_string());
    }

    let (scope, as_of) = match scope_part {
        None => (SourceScope::Internal, None),
        Some(part) => {
            let (scope_raw, as_of_raw) = match part.split_once('!') {
                Some((scope, as_of)) => (scope, Some(as_of)),
                None => (part, None),
            };
            let scope = SourceScope::parse(scope_raw).ok_or_else(|| {
                format!("unknown scope {scope_raw:?} (valid: {})", SourceScope::VALUES.join("|"))
            })?;
            let as_of = as_of_raw
                .map(|d| {
                    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                        .map_err(|_| format!("as_of {d:?} is not YYYY-MM-DD"))
                })
                .transpose()?;
            (scope, as_of)
        }
    };

    let params = parse_query(query.unwrap_or_default())?;
    let contract = params
        .get("contract_ref")
        .cloned()
        .ok_or("contract_ref is required")?;
    let provider = params.get("provider_id").cloned();

    if scope == SourceScope::External {
        if provider.is_none() {
            return Err("external source requires provider_id".to_string());
        }
        if as_of.is_none() {
            return Err("external source requires !as_of".to_string());
        }
    } else {
        if provider.is_some() {
            return Err("provider_id is only allowed on external sources".to_string());
        }
        if as_of.is_some() {
            return Err("as_of is only allowed on external sources".to_string());
        }
    }

    let upstream_system = match params.get("upstream_system") {
        Some(raw) => SystemId::parse(raw).map_err(|e| e.to_string())?,
        None => field_system.clone(),
    };

    Ok(Source {
        kind,
        target: target.to_string(),
        path: path.to_string(),
        scope,
        contract,
        provider,
        as_of,
        upstream_system,
        query_keys: params.into_keys().collect(),
    })
}

fn parse_query(query: &str) -> Result<BTreeMap<String, String>, String> {
    let mut params = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.trim().is_empty()) {
        let (key, value) =
            pair.split_once('=').ok_or_else(|| format!("query parameter {pair:?} has no value"))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(format!("query parameter {pair:?} is empty"));
        }
        if params.insert(key.to_string(), value.to_string()).is_some() {
            return Err(format!("query parameter {key:?} repeated"));
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> SystemId {
        SystemId::parse("checkout-service").unwrap()
    }

    #[test]
    fn parses_internal_source_with_defaults() {
        let source =
            parse_source("api:identity.GetUser#response.id?contract_ref=proto://identity/v1", &system())
                .unwrap();
        assert_eq!(source.kind, SourceKind::Api);
        assert_eq!(source.target, "identity.GetUser");
        assert_eq!(source.path, "response.id");
        assert_eq!(source.scope, SourceScope::Internal);
        assert_eq!(source.upstream_system, system());
        assert_eq!(source.query_keys, vec!["contract_ref".to_string()]);
    }

    #[test]
    fn contract_ref_may_contain_at_sign() {
        let source = parse_source(
            "db:users#email@cross_repo?contract_ref=git+https://repo@abc123&upstream_system=Identity",
            &system(),
        )
        .unwrap();
        assert_eq!(source.scope, SourceScope::CrossRepo);
        assert_eq!(source.contract, "git+https://repo@abc123");
        assert_eq!(source.upstream_system.as_str(), "identity");
    }

    #[test]
    fn external_source_requires_provider_and_as_of() {
        let ok = parse_source(
            "api:fx.rates#usd@external!2026-01-15?contract_ref=fx-v2&provider_id=acme",
            &system(),
        )
        .unwrap();
        assert_eq!(ok.provider.as_deref(), Some("acme"));
        assert_eq!(ok.as_of, NaiveDate::from_ymd_opt(2026, 1, 15));

        let err = parse_source("api:fx.rates#usd@external?contract_ref=fx-v2&provider_id=acme", &system())
            .unwrap_err();
        assert!(err.contains("as_of"));
    }

    #[test]
    fn provider_forbidden_on_internal_sources() {
        let err = parse_source("db:t#c?contract_ref=x&provider_id=acme", &system()).unwrap_err();
        assert!(err.contains("provider_id"));
    }

    #[test]
    fn missing_contract_is_rejected() {
        assert!(parse_source("cache:session#user", &system()).unwrap_err().contains("contract_ref"));
    }

    #[test]
    fn list_reports_every_bad_ref() {
        let errors =
            parse_sources("queue:x#y?contract_ref=a, db:t#c?contract_ref=b, api:t", &system())
                .unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
