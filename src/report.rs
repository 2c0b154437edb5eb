//! Rendering of evaluation results for people and machines.

use serde::Serialize;

use crate::error::LineageError;
use crate::policy::Evaluation;

/// Output format for `diff`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Pretty JSON.
    #[default]
    Json,
    /// Aligned table.
    Text,
}

/// Pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`LineageError::Serialize`] if `value` fails to encode.
pub fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, LineageError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| LineageError::serialize(what, e))?;
    json.push('\n');
    Ok(json)
}

/// Renders an evaluation in the requested format.
///
/// # Errors
///
/// Returns an error only when JSON encoding fails.
pub fn render(evaluation: &Evaluation, format: Format) -> Result<String, LineageError> {
    match format {
        Format::Json => to_json(evaluation, "diff report"),
        Format::Text => Ok(render_text(evaluation)),
    }
}

/// Aligned table of findings followed by events, notes and the gate.
#[must_use]
pub fn render_text(evaluation: &Evaluation) -> String {
    let mut out = String::new();

    if evaluation.findings.is_empty() {
        out.push_str("No findings.\n");
    } else {
        let rows: Vec<[String; 5]> = evaluation
            .findings
            .iter()
            .map(|f| {
                let gate = if f.overridden { "overridden".to_string() } else { f.gate_action.to_string() };
                [
                    f.field_id.clone(),
                    f.change_type.to_string(),
                    f.severity.to_string(),
                    scope_label(f.impact_scope).to_string(),
                    gate,
                ]
            })
            .collect();
        let header = ["FIELD", "CHANGE", "SEVERITY", "SCOPE", "GATE"];
        let widths: Vec<usize> = (0..header.len())
            .map(|i| rows.iter().map(|r| r[i].len()).max().unwrap_or(0).max(header[i].len()))
            .collect();

        push_row(&mut out, &header.map(str::to_string), &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_row(&mut out, &rule, &widths);
        for row in &rows {
            push_row(&mut out, row, &widths);
        }

        out.push('\n');
        for finding in &evaluation.findings {
            out.push_str(&format!("{} {}: {}\n", finding.field_id, finding.change_type, finding.cause));
            out.push_str(&format!("  impact: {}\n", finding.impact));
            out.push_str(&format!("  remediation: {}\n", finding.remediation));
            if !finding.owner.is_empty() {
                out.push_str(&format!("  owner: {}\n", finding.owner));
            }
            if let Some(reason) = &finding.reason {
                out.push_str(&format!("  reason: {reason}\n"));
            }
        }
    }

    if !evaluation.change_events.is_empty() {
        out.push_str("\nChange events (self-only):\n");
        for event in &evaluation.change_events {
            out.push_str(&format!(
                "  {} {} ({}): {}\n",
                event.field_id, event.change_type, event.severity, event.message
            ));
        }
    }

    if !evaluation.notes.is_empty() {
        out.push_str("\nPolicy notes:\n");
        for note in &evaluation.notes {
            out.push_str(&format!("  {note}\n"));
        }
    }

    let s = &evaluation.summary;
    out.push_str(&format!(
        "\n{} finding(s): {} high, {} medium, {} low, {} info; {} overridden; {} change event(s).\n",
        s.total, s.high, s.medium, s.low, s.info, s.overridden, s.change_events
    ));
    out.push_str(&format!(
        "Gate: {} (policy {}, threshold {}, mode {})\n",
        evaluation.gate.action, evaluation.policy_id, evaluation.gate.threshold, evaluation.gate.mode
    ));
    for reason in &evaluation.gate.reasons {
        out.push_str(&format!("  - {reason}\n"));
    }
    out
}

fn scope_label(scope: crate::model::ImpactScope) -> &'static str {
    match scope {
        crate::model::ImpactScope::Downstream => "downstream",
        crate::model::ImpactScope::SelfOnly => "self_only",
        crate::model::ImpactScope::Unknown => "unknown",
    }
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
