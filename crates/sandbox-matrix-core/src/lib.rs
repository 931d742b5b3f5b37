//! Sandbox Matrix Core
//!
//! Deterministic assignment of sandbox templates to parallel CI executors:
//! - `catalog`: immutable templates, cadences and tasks
//! - `config`: TOML catalog loading
//! - `filter`: which templates run a task on a cadence
//! - `candidates`: where the pre-filter candidate list comes from
//! - `resolver`: executor coordinates to template

pub mod candidates;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod resolver;
pub mod telemetry;

pub use candidates::{CadenceMembership, CandidateSource, SandboxDirectory};
pub use catalog::{
    Cadence, CadenceKey, Catalog, Task, TaskKey, Template, TemplateKey, DEFAULT_PARALLELISM,
};
pub use config::{
    CatalogFile, MatrixConfig, SandboxSettings, WorkflowSettings, DEFAULT_CATALOG_FILE,
};
pub use error::{MatrixError, Result};
pub use filter::{is_applicable, ApplicabilityFilter};
pub use resolver::{compute_candidates_digest, Assignment, AssignmentResolver, ExecutorCoordinates};
pub use telemetry::init_tracing;

/// Sandbox matrix version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
