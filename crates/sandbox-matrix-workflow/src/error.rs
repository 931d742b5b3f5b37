//! Error types for workflow store and audit operations

use std::path::PathBuf;

use sandbox_matrix_core::{CadenceKey, MatrixError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow file for cadence \"{cadence}\" not found at {}", .path.display())]
    MissingWorkflow { cadence: CadenceKey, path: PathBuf },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] MatrixError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;
