//! Sandbox Matrix Workflow
//!
//! Keeps the parallelism declared in CI workflow files consistent with the
//! template catalog:
//! - `store`: one workflow file per cadence
//! - `document`: line-oriented job block scanning
//! - `audit`: expected vs declared parallelism across the matrix
//! - `patch`: format-preserving rewrites of `parallelism:` values
//! - `fixer`: one read, one patch and at most one write per file
//! - `report`: text and JSON rendering

pub mod audit;
pub mod document;
pub mod error;
pub mod fixer;
pub mod patch;
pub mod report;
pub mod store;

pub use audit::{
    AuditReport, AuditScope, Auditor, CadenceAudit, Mismatch, PairAudit, PairOutcome,
    WorkflowFile, WorkflowSet,
};
pub use document::{DeclaredParallelism, JobBlock, JobLookup, WorkflowDocument};
pub use error::{Result, WorkflowError};
pub use fixer::{apply_fixes, AppliedFix, FixSummary, UnresolvedPair};
pub use patch::{patch, Fix, PatchOutcome, UnresolvedFix, UnresolvedReason};
pub use report::{render_check_json, render_check_text, render_fix_json, render_fix_text};
pub use store::{FsWorkflowStore, MemoryWorkflowStore, WorkflowStore};
