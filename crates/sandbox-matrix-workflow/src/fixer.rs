//! Fix orchestration: audit result in, patched workflow files out.
//!
//! Fixes are grouped by cadence so each workflow file goes through exactly
//! one patch and at most one write. The text patched is the text the audit
//! read, never a second read of the store.

use serde::Serialize;
use tracing::{info, warn};

use sandbox_matrix_core::{CadenceKey, TaskKey};

use crate::audit::{AuditReport, PairOutcome, WorkflowSet};
use crate::document::DeclaredParallelism;
use crate::error::{Result, WorkflowError};
use crate::patch::{patch, Fix, UnresolvedReason};
use crate::store::WorkflowStore;

/// A fix that was written to its workflow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFix {
    pub cadence: CadenceKey,
    pub task: TaskKey,
    pub job: String,
    pub old: DeclaredParallelism,
    pub new: usize,
}

/// A fix that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPair {
    pub cadence: CadenceKey,
    pub task: TaskKey,
    pub job: String,
    pub expected: usize,
    #[serde(flatten)]
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixSummary {
    pub applied: Vec<AppliedFix>,
    pub unresolved: Vec<UnresolvedPair>,
    /// Cadences whose workflow file was rewritten, in write order.
    pub written: Vec<CadenceKey>,
}

impl FixSummary {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

struct PlannedFix {
    task: TaskKey,
    old: Option<DeclaredParallelism>,
    fix: Fix,
}

/// Patch every mismatch in `report` and write each changed file once.
///
/// Ambiguous pairs are carried into the patch so they surface as unresolved.
pub fn apply_fixes(
    store: &dyn WorkflowStore,
    workflows: &WorkflowSet,
    report: &AuditReport,
) -> Result<FixSummary> {
    let mut summary = FixSummary::default();

    for cadence in &report.cadences {
        let planned: Vec<PlannedFix> = cadence
            .pairs
            .iter()
            .filter_map(|pair| {
                let old = match &pair.outcome {
                    PairOutcome::Mismatch { declared } => Some(declared.clone()),
                    PairOutcome::Ambiguous { .. } => None,
                    _ => return None,
                };
                Some(PlannedFix {
                    task: pair.task.clone(),
                    old,
                    fix: Fix::new(pair.job.clone(), pair.expected),
                })
            })
            .collect();
        if planned.is_empty() {
            continue;
        }

        let file = workflows
            .get(&cadence.cadence)
            .ok_or_else(|| WorkflowError::MissingWorkflow {
                cadence: cadence.cadence.clone(),
                path: cadence.location.clone(),
            })?;
        let fixes: Vec<Fix> = planned.iter().map(|p| p.fix.clone()).collect();
        let outcome = patch(&file.text, &fixes);

        for plan in &planned {
            if let Some(unresolved) = outcome.unresolved.iter().find(|u| u.fix == plan.fix) {
                warn!(
                    cadence = %cadence.cadence,
                    job = %plan.fix.job,
                    reason = %unresolved.reason,
                    "Fix not applied"
                );
                summary.unresolved.push(UnresolvedPair {
                    cadence: cadence.cadence.clone(),
                    task: plan.task.clone(),
                    job: plan.fix.job.clone(),
                    expected: plan.fix.parallelism,
                    reason: unresolved.reason.clone(),
                });
            } else if let Some(old) = &plan.old {
                summary.applied.push(AppliedFix {
                    cadence: cadence.cadence.clone(),
                    task: plan.task.clone(),
                    job: plan.fix.job.clone(),
                    old: old.clone(),
                    new: plan.fix.parallelism,
                });
            }
        }

        if outcome.is_changed() {
            store.write(&cadence.cadence, &outcome.text)?;
            summary.written.push(cadence.cadence.clone());
        }
    }

    info!(
        applied = summary.applied.len(),
        unresolved = summary.unresolved.len(),
        files = summary.written.len(),
        "Fix complete"
    );
    Ok(summary)
}
