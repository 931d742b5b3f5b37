//! Format-preserving parallelism patches.
//!
//! All fixes for one file are located against the same line array, turned
//! into splice edits, and applied bottom-up in a single pass so no edit
//! shifts the position of another. Lines outside the edits are untouched.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::document::{JobLookup, WorkflowDocument};

/// Set `job`'s parallelism to `parallelism`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fix {
    pub job: String,
    pub parallelism: usize,
}

impl Fix {
    pub fn new(job: impl Into<String>, parallelism: usize) -> Self {
        Self {
            job: job.into(),
            parallelism,
        }
    }
}

/// Why a fix was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NotFound,
    Ambiguous { occurrences: usize },
    /// An earlier fix in the same batch already targets the job.
    Conflict,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NotFound => write!(f, "job header not found"),
            UnresolvedReason::Ambiguous { occurrences } => {
                write!(f, "job header is ambiguous ({occurrences} matches)")
            }
            UnresolvedReason::Conflict => write!(f, "conflicting fix for the same job"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedFix {
    pub fix: Fix,
    #[serde(flatten)]
    pub reason: UnresolvedReason,
}

/// Patched text plus what was and was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub text: String,
    pub applied: Vec<Fix>,
    pub unresolved: Vec<UnresolvedFix>,
}

impl PatchOutcome {
    pub fn is_changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug)]
enum Edit {
    Replace { line: usize, text: String },
    Insert { before: usize, text: String },
}

impl Edit {
    fn position(&self) -> usize {
        match self {
            Edit::Replace { line, .. } => *line,
            Edit::Insert { before, .. } => *before,
        }
    }
}

/// Apply `fixes` to `text`.
///
/// A job whose header is missing or occurs more than once is reported as
/// unresolved; the remaining fixes still apply.
pub fn patch(text: &str, fixes: &[Fix]) -> PatchOutcome {
    let document = WorkflowDocument::parse(text);
    let line_ending = if document.uses_crlf() { "\r" } else { "" };

    let mut edits = Vec::with_capacity(fixes.len());
    let mut applied = Vec::new();
    let mut unresolved = Vec::new();
    let mut targeted = HashSet::new();

    for fix in fixes {
        if !targeted.insert(fix.job.as_str()) {
            unresolved.push(UnresolvedFix {
                fix: fix.clone(),
                reason: UnresolvedReason::Conflict,
            });
            continue;
        }

        let block = match document.find_job(&fix.job) {
            JobLookup::Found(block) => block,
            JobLookup::Missing => {
                warn!(job = %fix.job, "Fix not applied: job header not found");
                unresolved.push(UnresolvedFix {
                    fix: fix.clone(),
                    reason: UnresolvedReason::NotFound,
                });
                continue;
            }
            JobLookup::Ambiguous { lines } => {
                warn!(job = %fix.job, occurrences = lines.len(), "Fix not applied: job header is ambiguous");
                unresolved.push(UnresolvedFix {
                    fix: fix.clone(),
                    reason: UnresolvedReason::Ambiguous {
                        occurrences: lines.len(),
                    },
                });
                continue;
            }
        };

        let edit = match &block.parallelism {
            Some(declared) => Edit::Replace {
                line: declared.line,
                text: declared.rewrite(document.lines()[declared.line], fix.parallelism),
            },
            None => Edit::Insert {
                before: block.header_line + 1,
                text: format!(
                    "{}parallelism: {}{}",
                    " ".repeat(block.insertion_indent()),
                    fix.parallelism,
                    line_ending
                ),
            },
        };
        debug!(job = %fix.job, edit = ?edit, "Planned fix");
        edits.push(edit);
        applied.push(fix.clone());
    }

    if edits.is_empty() {
        return PatchOutcome {
            text: text.to_string(),
            applied,
            unresolved,
        };
    }

    // Bottom-up so earlier positions stay valid; a replace at a position is
    // applied before an insert at the same position.
    edits.sort_by(|a, b| {
        b.position()
            .cmp(&a.position())
            .then_with(|| matches!(a, Edit::Insert { .. }).cmp(&matches!(b, Edit::Insert { .. })))
    });

    let mut lines: Vec<String> = document.lines().iter().map(|l| l.to_string()).collect();
    for edit in edits {
        match edit {
            Edit::Replace { line, text } => lines[line] = text,
            Edit::Insert { before, text } => lines.insert(before, text),
        }
    }

    PatchOutcome {
        text: lines.join("\n"),
        applied,
        unresolved,
    }
}

/// Line numbers (one-based) that differ between two texts of equal line count.
#[cfg(test)]
pub(crate) fn changed_lines(before: &str, after: &str) -> Vec<usize> {
    before
        .split('\n')
        .zip(after.split('\n'))
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = "\
# Nightly workflow
# Keep jobs sorted by stage.

jobs:
  - build

  # Sandboxes are generated once per template.
  - create-sandboxes:
      parallelism: 14   # one per template
      requires:
        - build
  - e2e-production:
      parallelism: 3
      requires:
        - build-sandboxes

  # Benchmarks
  - bench:
      requires:
        - build-sandboxes
";

    #[test]
    fn test_replace_only_touches_value_line() {
        let outcome = patch(WORKFLOW, &[Fix::new("e2e-production", 1)]);
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.unresolved.is_empty());
        assert_eq!(changed_lines(WORKFLOW, &outcome.text), vec![13]);
        assert!(outcome.text.contains("  - e2e-production:\n      parallelism: 1\n"));
    }

    #[test]
    fn test_replace_keeps_trailing_comment_spacing() {
        let outcome = patch(WORKFLOW, &[Fix::new("create-sandboxes", 9)]);
        assert!(outcome.text.contains("      parallelism: 9   # one per template\n"));
        assert_eq!(changed_lines(WORKFLOW, &outcome.text), vec![9]);
    }

    #[test]
    fn test_insert_uses_block_indentation() {
        let outcome = patch(WORKFLOW, &[Fix::new("bench", 3)]);
        assert!(outcome
            .text
            .contains("  - bench:\n      parallelism: 3\n      requires:\n"));
        assert_eq!(
            outcome.text.lines().count(),
            WORKFLOW.lines().count() + 1
        );
    }

    #[test]
    fn test_batch_with_insert_above_replace() {
        let text = "jobs:\n  - bench:\n      requires:\n        - build\n  - e2e-production:\n      parallelism: 3\n";
        let outcome = patch(
            text,
            &[Fix::new("bench", 2), Fix::new("e2e-production", 5)],
        );
        assert_eq!(
            outcome.text,
            "jobs:\n  - bench:\n      parallelism: 2\n      requires:\n        - build\n  - e2e-production:\n      parallelism: 5\n"
        );
    }

    #[test]
    fn test_unresolved_fixes_do_not_block_others() {
        let text = "jobs:\n  - bench:\n      parallelism: 1\n  - dup:\n  - dup:\n";
        let outcome = patch(
            text,
            &[
                Fix::new("missing", 2),
                Fix::new("dup", 2),
                Fix::new("bench", 4),
            ],
        );
        assert_eq!(outcome.applied, vec![Fix::new("bench", 4)]);
        assert_eq!(outcome.unresolved.len(), 2);
        assert_eq!(outcome.unresolved[0].reason, UnresolvedReason::NotFound);
        assert_eq!(
            outcome.unresolved[1].reason,
            UnresolvedReason::Ambiguous { occurrences: 2 }
        );
        assert!(outcome.text.contains("  - dup:\n  - dup:\n"));
    }

    #[test]
    fn test_nothing_resolved_leaves_text_identical() {
        let outcome = patch(WORKFLOW, &[Fix::new("chromatic-sandboxes", 4)]);
        assert!(!outcome.is_changed());
        assert_eq!(outcome.text, WORKFLOW);
    }

    #[test]
    fn test_conflicting_fix_rejected() {
        let outcome = patch(
            WORKFLOW,
            &[Fix::new("e2e-production", 1), Fix::new("e2e-production", 2)],
        );
        assert_eq!(outcome.applied, vec![Fix::new("e2e-production", 1)]);
        assert_eq!(outcome.unresolved[0].reason, UnresolvedReason::Conflict);
    }

    #[test]
    fn test_crlf_preserved_on_insert() {
        let text = "jobs:\r\n  - bench:\r\n      requires:\r\n        - build\r\n";
        let outcome = patch(text, &[Fix::new("bench", 2)]);
        assert_eq!(
            outcome.text,
            "jobs:\r\n  - bench:\r\n      parallelism: 2\r\n      requires:\r\n        - build\r\n"
        );
    }

    #[test]
    fn test_missing_trailing_newline_preserved() {
        let text = "jobs:\n  - bench:\n      parallelism: 1";
        let outcome = patch(text, &[Fix::new("bench", 2)]);
        assert_eq!(outcome.text, "jobs:\n  - bench:\n      parallelism: 2");
    }

    #[test]
    fn test_patch_is_idempotent() {
        let fixes = [Fix::new("bench", 3), Fix::new("e2e-production", 1)];
        let once = patch(WORKFLOW, &fixes);
        let twice = patch(&once.text, &fixes);
        assert_eq!(once.text, twice.text);
    }
}
