//! Parallelism audit across the cadence × task matrix.
//!
//! For every pair the expected executor count is the size of the applicable
//! template set; the declared count is read from the cadence's workflow file.
//! The audit is read-only and runs to completion before anything is patched.

use std::path::PathBuf;

use sandbox_matrix_core::{
    ApplicabilityFilter, Cadence, CadenceKey, Catalog, Task, TaskKey, TemplateKey,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{DeclaredParallelism, JobLookup, WorkflowDocument};
use crate::error::{Result, WorkflowError};
use crate::store::WorkflowStore;

/// One cadence's workflow text, read once per invocation.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub cadence: CadenceKey,
    pub location: PathBuf,
    pub text: String,
}

/// Every workflow file an invocation needs, fully materialized.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSet {
    files: Vec<WorkflowFile>,
}

impl WorkflowSet {
    /// Read the workflow of each cadence. Any missing file aborts the load.
    pub fn load<'c>(
        store: &dyn WorkflowStore,
        cadences: impl IntoIterator<Item = &'c CadenceKey>,
    ) -> Result<Self> {
        let mut files = Vec::new();
        for cadence in cadences {
            files.push(WorkflowFile {
                cadence: cadence.clone(),
                location: store.location(cadence),
                text: store.read(cadence)?,
            });
        }
        Ok(Self { files })
    }

    pub fn from_files(files: Vec<WorkflowFile>) -> Self {
        Self { files }
    }

    pub fn get(&self, cadence: &CadenceKey) -> Option<&WorkflowFile> {
        self.files.iter().find(|f| &f.cadence == cadence)
    }

    pub fn files(&self) -> &[WorkflowFile] {
        &self.files
    }
}

/// Which part of the matrix to audit.
#[derive(Debug, Clone, Default)]
pub struct AuditScope {
    pub cadence: Option<String>,
    pub task: Option<String>,
}

impl AuditScope {
    pub fn all() -> Self {
        Self::default()
    }

    /// Cadences and tasks in scope, in catalog order. Unknown keys fail.
    pub fn select<'a>(&self, catalog: &'a Catalog) -> Result<(Vec<&'a Cadence>, Vec<&'a Task>)> {
        let cadences = match &self.cadence {
            Some(name) => vec![catalog.cadence(name)?],
            None => catalog.cadences().iter().collect(),
        };
        let tasks = match &self.task {
            Some(name) => vec![catalog.task(name)?],
            None => catalog.tasks().iter().collect(),
        };
        Ok((cadences, tasks))
    }
}

/// What the audit concluded for one (cadence, task) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    /// Declared parallelism matches.
    Ok { declared: DeclaredParallelism },
    /// Declared parallelism differs from the applicable template count.
    Mismatch { declared: DeclaredParallelism },
    /// No template runs the task on this cadence.
    FullySkipped,
    /// Templates apply, but the workflow has no block for the job.
    NotDeclared,
    /// The job header occurs more than once; nothing can be verified.
    Ambiguous { occurrences: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairAudit {
    pub task: TaskKey,
    pub job: String,
    pub expected: usize,
    #[serde(flatten)]
    pub outcome: PairOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CadenceAudit {
    pub cadence: CadenceKey,
    pub location: PathBuf,
    pub pairs: Vec<PairAudit>,
}

/// A declared parallelism that disagrees with the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub cadence: CadenceKey,
    pub task: TaskKey,
    pub job: String,
    pub declared: DeclaredParallelism,
    pub expected: usize,
}

/// Audit result, grouped by cadence then task in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub cadences: Vec<CadenceAudit>,
    /// Templates excluded from every task by their in-development flag.
    pub in_development: Vec<TemplateKey>,
}

impl AuditReport {
    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.cadences
            .iter()
            .flat_map(|c| {
                c.pairs.iter().filter_map(move |pair| match &pair.outcome {
                    PairOutcome::Mismatch { declared } => Some(Mismatch {
                        cadence: c.cadence.clone(),
                        task: pair.task.clone(),
                        job: pair.job.clone(),
                        declared: declared.clone(),
                        expected: pair.expected,
                    }),
                    _ => None,
                })
            })
            .collect()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.cadences
            .iter()
            .flat_map(|c| &c.pairs)
            .filter(|p| matches!(p.outcome, PairOutcome::Ambiguous { .. }))
            .count()
    }

    /// True when every declared job matches and none is ambiguous.
    pub fn is_consistent(&self) -> bool {
        self.cadences.iter().flat_map(|c| &c.pairs).all(|p| {
            !matches!(
                p.outcome,
                PairOutcome::Mismatch { .. } | PairOutcome::Ambiguous { .. }
            )
        })
    }
}

/// Compares expected and declared parallelism.
pub struct Auditor<'a> {
    catalog: &'a Catalog,
}

impl<'a> Auditor<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Load the workflows in scope from `store` and audit them.
    pub fn load_and_audit(
        &self,
        store: &dyn WorkflowStore,
        scope: &AuditScope,
    ) -> Result<(WorkflowSet, AuditReport)> {
        let (cadences, _) = scope.select(self.catalog)?;
        let workflows = WorkflowSet::load(store, cadences.iter().copied().map(|c| &c.key))?;
        let report = self.audit(&workflows, scope)?;
        Ok((workflows, report))
    }

    pub fn audit(&self, workflows: &WorkflowSet, scope: &AuditScope) -> Result<AuditReport> {
        let (cadences, tasks) = scope.select(self.catalog)?;
        let filter = ApplicabilityFilter::new(self.catalog);
        let default = self.catalog.default_parallelism();

        let mut report = AuditReport {
            cadences: Vec::with_capacity(cadences.len()),
            in_development: self.catalog.in_development().into_iter().cloned().collect(),
        };
        if !report.in_development.is_empty() {
            warn!(
                templates = ?report.in_development,
                "In-development templates are excluded from every task"
            );
        }

        for cadence in cadences {
            let file = workflows
                .get(&cadence.key)
                .ok_or_else(|| WorkflowError::MissingWorkflow {
                    cadence: cadence.key.clone(),
                    path: PathBuf::from(cadence.key.as_str()),
                })?;
            let document = WorkflowDocument::parse(&file.text);

            let mut pairs = Vec::with_capacity(tasks.len());
            for task in &tasks {
                let expected = filter.filter_candidates(&cadence.templates, task).len();
                let outcome = if expected == 0 {
                    PairOutcome::FullySkipped
                } else {
                    match document.find_job(&task.job) {
                        JobLookup::Missing => PairOutcome::NotDeclared,
                        JobLookup::Ambiguous { lines } => {
                            warn!(
                                cadence = %cadence.key,
                                job = %task.job,
                                occurrences = lines.len(),
                                "Job header is ambiguous"
                            );
                            PairOutcome::Ambiguous {
                                occurrences: lines.len(),
                            }
                        }
                        JobLookup::Found(block) => {
                            let declared = block.declared_parallelism(default);
                            if declared.effective() == Some(expected) {
                                PairOutcome::Ok { declared }
                            } else {
                                PairOutcome::Mismatch { declared }
                            }
                        }
                    }
                };
                debug!(
                    cadence = %cadence.key,
                    task = %task.key,
                    expected,
                    outcome = ?outcome,
                    "Audited pair"
                );
                pairs.push(PairAudit {
                    task: task.key.clone(),
                    job: task.job.clone(),
                    expected,
                    outcome,
                });
            }

            report.cadences.push(CadenceAudit {
                cadence: cadence.key.clone(),
                location: file.location.clone(),
                pairs,
            });
        }

        info!(
            cadences = report.cadences.len(),
            mismatches = report.mismatches().len(),
            ambiguous = report.ambiguous_count(),
            "Audit complete"
        );
        Ok(report)
    }
}
