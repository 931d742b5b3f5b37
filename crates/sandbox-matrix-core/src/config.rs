//! Catalog configuration file loading.
//!
//! The catalog lives in a TOML file. Arrays of tables are used for
//! templates, cadences and tasks so declaration order survives parsing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Cadence, Catalog, Task, Template, DEFAULT_PARALLELISM};
use crate::error::{MatrixError, Result};

/// Default catalog file name, resolved against the working directory.
pub const DEFAULT_CATALOG_FILE: &str = "sandbox-matrix.toml";

/// Default workflow directory, relative to the catalog file.
pub const DEFAULT_WORKFLOWS_DIR: &str = ".circleci/src/workflows";

/// Default directory generated sandboxes live in, relative to the catalog file.
pub const DEFAULT_SANDBOX_DIR: &str = "sandbox";

/// Where workflow files live and how undeclared parallelism is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_workflows_dir")]
    pub dir: PathBuf,

    /// File extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_parallelism")]
    pub default_parallelism: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            dir: default_workflows_dir(),
            extension: default_extension(),
            default_parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Where generated sandboxes are looked up when narrowing candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_sandbox_dir")]
    pub dir: PathBuf,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            dir: default_sandbox_dir(),
        }
    }
}

fn default_sandbox_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SANDBOX_DIR)
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WORKFLOWS_DIR)
}

fn default_extension() -> String {
    "yml".to_string()
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

/// Raw on-disk shape of the catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default)]
    pub workflows: WorkflowSettings,

    #[serde(default)]
    pub sandboxes: SandboxSettings,

    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub cadences: Vec<Cadence>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A loaded, validated catalog plus the settings that accompany it.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub catalog: Catalog,
    pub workflows: WorkflowSettings,
    pub sandboxes: SandboxSettings,
}

impl MatrixConfig {
    /// Parse and validate catalog TOML.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(source)?;
        Self::from_file(file)
    }

    pub fn from_file(file: CatalogFile) -> Result<Self> {
        if file.workflows.default_parallelism == 0 {
            return Err(MatrixError::Config(
                "workflows.default_parallelism must be at least 1".to_string(),
            ));
        }
        if file.workflows.extension.trim().is_empty() {
            return Err(MatrixError::Config(
                "workflows.extension must not be empty".to_string(),
            ));
        }
        let catalog = Catalog::new(file.templates, file.cadences, file.tasks)?
            .with_default_parallelism(file.workflows.default_parallelism);
        Ok(Self {
            catalog,
            workflows: file.workflows,
            sandboxes: file.sandboxes,
        })
    }

    /// Load a catalog file. Relative workflow and sandbox directories are
    /// resolved against the catalog file's parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            MatrixError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read catalog {}: {}", path.display(), e),
            ))
        })?;
        let mut config = Self::from_toml_str(&source)?;
        if let Some(parent) = path.parent() {
            if config.workflows.dir.is_relative() {
                config.workflows.dir = parent.join(&config.workflows.dir);
            }
            if config.sandboxes.dir.is_relative() {
                config.sandboxes.dir = parent.join(&config.sandboxes.dir);
            }
        }
        debug!(
            path = %path.display(),
            templates = config.catalog.templates().len(),
            cadences = config.catalog.cadences().len(),
            tasks = config.catalog.tasks().len(),
            "Loaded catalog"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[workflows]
dir = "workflows"
default_parallelism = 3

[[templates]]
key = "react-vite/default-ts"
type_check = true

[[templates]]
key = "angular-cli/default-ts"
skip_tasks = ["e2e-tests"]

[[cadences]]
name = "normal"
templates = ["react-vite/default-ts", "angular-cli/default-ts"]

[[tasks]]
name = "build"
job = "build-sandboxes"

[[tasks]]
name = "e2e-tests"
job = "e2e-production"

[[tasks]]
name = "check-sandbox"
job = "check-sandboxes"
type_check = true
"#;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let config = MatrixConfig::from_toml_str(SAMPLE).unwrap();
        let keys: Vec<&str> = config
            .catalog
            .templates()
            .iter()
            .map(|t| t.key.as_str())
            .collect();
        assert_eq!(keys, vec!["react-vite/default-ts", "angular-cli/default-ts"]);
        let tasks: Vec<&str> = config.catalog.tasks().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(tasks, vec!["build", "e2e-tests", "check-sandbox"]);
        assert_eq!(config.catalog.default_parallelism(), 3);
    }

    #[test]
    fn test_workflow_defaults() {
        let config = MatrixConfig::from_toml_str("").unwrap();
        assert_eq!(config.workflows, WorkflowSettings::default());
        assert_eq!(config.catalog.default_parallelism(), DEFAULT_PARALLELISM);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = MatrixConfig::from_toml_str("[[templates]]\nkey = \"a\"\n[extra]\n").unwrap_err();
        assert!(matches!(err, MatrixError::ConfigParse(_)));
    }

    #[test]
    fn test_zero_default_parallelism_rejected() {
        let err =
            MatrixConfig::from_toml_str("[workflows]\ndefault_parallelism = 0\n").unwrap_err();
        assert!(matches!(err, MatrixError::Config(_)));
    }

    #[test]
    fn test_load_resolves_workflow_dir_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox-matrix.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = MatrixConfig::load(&path).unwrap();
        assert_eq!(config.workflows.dir, dir.path().join("workflows"));
        assert_eq!(config.sandboxes.dir, dir.path().join(DEFAULT_SANDBOX_DIR));
    }

    #[test]
    fn test_sandbox_dir_setting() {
        let config =
            MatrixConfig::from_toml_str("[sandboxes]\ndir = \"../sandboxes\"\n").unwrap();
        assert_eq!(config.sandboxes.dir, PathBuf::from("../sandboxes"));
        let defaults = MatrixConfig::from_toml_str("").unwrap();
        assert_eq!(defaults.sandboxes, SandboxSettings::default());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MatrixConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, MatrixError::Io(_)));
    }
}
