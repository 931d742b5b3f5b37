//! Rendering of audit reports and fix summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditReport, PairOutcome};
use crate::error::Result;
use crate::fixer::FixSummary;

/// Machine-readable output of `check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckDocument<'a> {
    pub generated_at: DateTime<Utc>,
    pub consistent: bool,
    pub mismatches: usize,
    pub report: &'a AuditReport,
}

/// Machine-readable output of `fix`.
#[derive(Debug, Clone, Serialize)]
pub struct FixDocument<'a> {
    pub generated_at: DateTime<Utc>,
    pub complete: bool,
    pub report: &'a AuditReport,
    pub summary: &'a FixSummary,
}

pub fn render_check_json(report: &AuditReport) -> Result<String> {
    let document = CheckDocument {
        generated_at: Utc::now(),
        consistent: report.is_consistent(),
        mismatches: report.mismatches().len(),
        report,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn render_fix_json(report: &AuditReport, summary: &FixSummary) -> Result<String> {
    let document = FixDocument {
        generated_at: Utc::now(),
        complete: summary.is_complete(),
        report,
        summary,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// The per-cadence matrix, one line per task.
pub fn render_matrix_text(report: &AuditReport) -> String {
    let mut out = Vec::new();
    for cadence in &report.cadences {
        out.push(format!("{} ({})", cadence.cadence, cadence.location.display()));
        for pair in &cadence.pairs {
            let line = match &pair.outcome {
                PairOutcome::Ok { declared } => format!(
                    "-- ✅ {} - parallelism: {}{}",
                    pair.job,
                    declared,
                    if declared.is_implicit() { " (default)" } else { "" }
                ),
                PairOutcome::Mismatch { declared } => format!(
                    "-- ❌ {} - parallelism: {}{} (should be {})",
                    pair.job,
                    declared,
                    if declared.is_implicit() { " (default)" } else { "" },
                    pair.expected
                ),
                PairOutcome::Ambiguous { occurrences } => format!(
                    "-- ❌ {} - job header is ambiguous ({} matches), expected {}",
                    pair.job, occurrences, pair.expected
                ),
                PairOutcome::NotDeclared => format!(
                    "-- {} - not declared in this workflow ({} applicable)",
                    pair.job, pair.expected
                ),
                PairOutcome::FullySkipped => {
                    format!("-- {} - this task is fully skipped for this cadence.", pair.task)
                }
            };
            out.push(line);
        }
        out.push(String::new());
    }
    out.join("\n")
}

fn render_in_development(report: &AuditReport) -> Option<String> {
    if report.in_development.is_empty() {
        return None;
    }
    let mut out = vec![
        "👇 Some templates were skipped as they are flagged to be in development. \
         Please review if they should still contain this flag:"
            .to_string(),
    ];
    out.extend(report.in_development.iter().map(|k| format!("- {k}")));
    Some(out.join("\n"))
}

/// Human-readable `check` output.
pub fn render_check_text(report: &AuditReport) -> String {
    let mut out = Vec::new();
    if report.is_consistent() {
        out.push("✅ The parallelism count is correct for all jobs:".to_string());
    } else {
        out.push("The parallelism count is incorrect for some jobs, you have to update them:".to_string());
    }
    out.push(String::new());
    out.push(render_matrix_text(report));

    if !report.is_consistent() {
        out.push("💡 Tip: run `sandbox-matrix fix` to update the workflow files automatically.".to_string());
        out.push(String::new());
    }
    if let Some(section) = render_in_development(report) {
        out.push(section);
    }
    out.join("\n")
}

/// Human-readable `fix` output.
pub fn render_fix_text(report: &AuditReport, summary: &FixSummary) -> String {
    let mut out = Vec::new();
    if summary.applied.is_empty() && summary.unresolved.is_empty() {
        out.push("✅ The parallelism count is correct for all jobs, nothing to fix.".to_string());
    } else if summary.applied.is_empty() {
        let count = summary.unresolved.len();
        out.push(format!(
            "❌ Could not fix the parallelism count for {} job{}:",
            count,
            if count == 1 { "" } else { "s" }
        ));
    } else {
        let count = summary.applied.len();
        out.push(format!(
            "🔧 Fixed parallelism counts for {} job{} in {} workflow file{}:",
            count,
            if count == 1 { "" } else { "s" },
            summary.written.len(),
            if summary.written.len() == 1 { "" } else { "s" }
        ));
    }
    out.push(String::new());
    out.push(render_matrix_text(report));

    if !summary.applied.is_empty() {
        out.push("✅ The parallelism of the following jobs was fixed:".to_string());
        for fix in &summary.applied {
            out.push(format!("  - {}/{}: {} → {}", fix.cadence, fix.job, fix.old, fix.new));
        }
        out.push(String::new());
    }
    if !summary.unresolved.is_empty() {
        out.push("❌ The following jobs could not be fixed:".to_string());
        for fix in &summary.unresolved {
            out.push(format!(
                "  - {}/{}: {} (needs {})",
                fix.cadence, fix.job, fix.reason, fix.expected
            ));
        }
        out.push(String::new());
    }
    if let Some(section) = render_in_development(report) {
        out.push(section);
    }
    out.join("\n")
}
