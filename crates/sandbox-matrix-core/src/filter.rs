//! Applicability filter: which templates must run a task on a cadence.

use tracing::debug;

use crate::catalog::{Catalog, Task, Template, TemplateKey};
use crate::error::Result;

/// Whether `template` takes part in `task`.
///
/// A pure conjunction: the template is not in development, does not skip
/// the task, and, for the type-check task only, has type checking enabled.
pub fn is_applicable(template: &Template, task: &Task) -> bool {
    !template.in_development
        && !template.skip_tasks.contains(&task.key)
        && (!task.type_check || template.type_check)
}

/// Computes ordered applicable template sets over a catalog.
#[derive(Debug, Clone, Copy)]
pub struct ApplicabilityFilter<'a> {
    catalog: &'a Catalog,
}

impl<'a> ApplicabilityFilter<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Templates of `cadence` that run `task`, in cadence order.
    ///
    /// An empty result is valid and means no job should exist for the pair.
    pub fn filter(&self, cadence: &str, task: &str) -> Result<Vec<TemplateKey>> {
        let cadence = self.catalog.cadence(cadence)?;
        let task = self.catalog.task(task)?;
        Ok(self.filter_candidates(&cadence.templates, task))
    }

    /// Narrow an explicit candidate list, preserving its order.
    ///
    /// Keys absent from the catalog are dropped.
    pub fn filter_candidates(&self, candidates: &[TemplateKey], task: &Task) -> Vec<TemplateKey> {
        let selected: Vec<TemplateKey> = candidates
            .iter()
            .filter_map(|key| self.catalog.template(key))
            .filter(|template| is_applicable(template, task))
            .map(|template| template.key.clone())
            .collect();
        debug!(
            task = %task.key,
            candidates = candidates.len(),
            selected = selected.len(),
            "Filtered candidates"
        );
        selected
    }
}
