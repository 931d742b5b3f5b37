//! Error taxonomy for catalog loading, filtering and executor assignment.

use crate::catalog::{CadenceKey, TaskKey, TemplateKey};

/// Sandbox matrix errors.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("unknown cadence \"{cadence}\" (known cadences: {})", .known.join(", "))]
    UnknownCadence { cadence: String, known: Vec<String> },

    #[error("the \"{task}\" task is not valid. Valid tasks are:\n{}", bullet_list(.known))]
    UnknownTask { task: String, known: Vec<String> },

    #[error("unknown template \"{template}\" referenced by {referenced_by}")]
    UnknownTemplate {
        template: String,
        referenced_by: String,
    },

    #[error("template \"{template}\" is declared more than once in {scope}")]
    DuplicateTemplate { template: String, scope: String },

    #[error("invalid executor coordinates: index {index} is not within 0..{total}")]
    InvalidCoordinates { index: usize, total: usize },

    #[error(
        "parallelism set incorrectly for the \"{task}\" task on cadence \"{cadence}\".\n\n\
         Parallelism is set to {total}, but there are {expected} templates to run for the \"{task}\" task:\n{}",
        bullet_list(.candidates)
    )]
    ParallelismMismatch {
        cadence: CadenceKey,
        task: TaskKey,
        expected: usize,
        total: usize,
        candidates: Vec<TemplateKey>,
    },

    #[error("invalid catalog configuration: {0}")]
    Config(String),

    #[error("failed to parse catalog configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

fn bullet_list<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
