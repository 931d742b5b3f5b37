//! Executor assignment: one template per parallel executor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::candidates::CandidateSource;
use crate::catalog::{CadenceKey, Catalog, TaskKey, TemplateKey};
use crate::error::{MatrixError, Result};
use crate::filter::ApplicabilityFilter;

/// Position of one executor in a fixed-size parallel pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorCoordinates {
    pub index: usize,
    pub total: usize,
}

impl ExecutorCoordinates {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    fn validate(&self) -> Result<()> {
        if self.index >= self.total {
            return Err(MatrixError::InvalidCoordinates {
                index: self.index,
                total: self.total,
            });
        }
        Ok(())
    }
}

impl Default for ExecutorCoordinates {
    fn default() -> Self {
        Self { index: 0, total: 1 }
    }
}

/// The template owned by one executor, plus what it was chosen from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub cadence: CadenceKey,
    pub task: TaskKey,
    pub template: TemplateKey,
    pub coordinates: ExecutorCoordinates,

    /// Full ordered candidate list after filtering.
    pub candidates: Vec<TemplateKey>,

    /// SHA-256 of the ordered candidates. Equal on every executor that
    /// agrees on the catalog.
    pub candidates_digest: String,
}

/// Resolves executor coordinates to templates.
pub struct AssignmentResolver<'a> {
    catalog: &'a Catalog,
    source: &'a dyn CandidateSource,
}

impl<'a> AssignmentResolver<'a> {
    pub fn new(catalog: &'a Catalog, source: &'a dyn CandidateSource) -> Self {
        Self { catalog, source }
    }

    /// Return the template for `coordinates`.
    ///
    /// Fails when the pool size differs from the number of applicable
    /// templates; the CI parallelism declaration must be fixed.
    pub fn resolve(
        &self,
        cadence: &str,
        task: &str,
        coordinates: ExecutorCoordinates,
    ) -> Result<Assignment> {
        let cadence = self.catalog.cadence(cadence)?;
        let task = self.catalog.task(task)?;
        coordinates.validate()?;

        let pool = self.source.candidates(self.catalog, cadence.key.as_str())?;
        let candidates = ApplicabilityFilter::new(self.catalog).filter_candidates(&pool, task);

        if candidates.len() != coordinates.total {
            return Err(MatrixError::ParallelismMismatch {
                cadence: cadence.key.clone(),
                task: task.key.clone(),
                expected: candidates.len(),
                total: coordinates.total,
                candidates,
            });
        }

        let template = candidates[coordinates.index].clone();
        let candidates_digest = compute_candidates_digest(&candidates);
        debug!(
            cadence = %cadence.key,
            task = %task.key,
            index = coordinates.index,
            total = coordinates.total,
            template = %template,
            digest = %&candidates_digest[..12],
            "Resolved executor assignment"
        );

        Ok(Assignment {
            cadence: cadence.key.clone(),
            task: task.key.clone(),
            template,
            coordinates,
            candidates,
            candidates_digest,
        })
    }
}

/// Deterministic digest of an ordered template list.
pub fn compute_candidates_digest(candidates: &[TemplateKey]) -> String {
    let mut hasher = Sha256::new();
    for key in candidates {
        hasher.update(key.as_str().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
