//! Workflow store: one text blob per cadence.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sandbox_matrix_core::{CadenceKey, WorkflowSettings};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, WorkflowError};

/// Read/write access to workflow files, addressed by cadence.
pub trait WorkflowStore {
    /// Where the cadence's workflow lives, for reporting.
    fn location(&self, cadence: &CadenceKey) -> PathBuf;

    /// Read the whole file. A missing file is [`WorkflowError::MissingWorkflow`].
    fn read(&self, cadence: &CadenceKey) -> Result<String>;

    /// Replace the whole file.
    fn write(&self, cadence: &CadenceKey, text: &str) -> Result<()>;
}

/// Filesystem-backed store: `<dir>/<cadence>.<extension>`.
#[derive(Debug, Clone)]
pub struct FsWorkflowStore {
    dir: PathBuf,
    extension: String,
}

impl FsWorkflowStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self::new(&settings.dir, &settings.extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl WorkflowStore for FsWorkflowStore {
    fn location(&self, cadence: &CadenceKey) -> PathBuf {
        self.dir.join(format!("{}.{}", cadence, self.extension))
    }

    fn read(&self, cadence: &CadenceKey) -> Result<String> {
        let path = self.location(cadence);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "Read workflow");
                Ok(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(WorkflowError::MissingWorkflow {
                cadence: cadence.clone(),
                path,
            }),
            Err(source) => Err(WorkflowError::Io { path, source }),
        }
    }

    fn write(&self, cadence: &CadenceKey, text: &str) -> Result<()> {
        let path = self.location(cadence);
        let io_err = |source: std::io::Error| WorkflowError::Io {
            path: path.clone(),
            source,
        };

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;

        // Keep the replaced file's mode; temp files are created 0600.
        match fs::metadata(&path) {
            Ok(existing) => tmp
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(io_err)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), bytes = text.len(), "Wrote workflow");
        Ok(())
    }
}

/// In-memory store for tests. Records every write.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    files: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<CadenceKey>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, cadence: &str, text: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(cadence.to_string(), text.to_string());
        self
    }

    pub fn get(&self, cadence: &str) -> Option<String> {
        self.files.lock().unwrap().get(cadence).cloned()
    }

    /// Cadences written so far, in write order.
    pub fn writes(&self) -> Vec<CadenceKey> {
        self.writes.lock().unwrap().clone()
    }
}

impl WorkflowStore for MemoryWorkflowStore {
    fn location(&self, cadence: &CadenceKey) -> PathBuf {
        PathBuf::from(format!("memory://{cadence}.yml"))
    }

    fn read(&self, cadence: &CadenceKey) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(cadence.as_str())
            .cloned()
            .ok_or_else(|| WorkflowError::MissingWorkflow {
                cadence: cadence.clone(),
                path: self.location(cadence),
            })
    }

    fn write(&self, cadence: &CadenceKey, text: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(cadence.to_string(), text.to_string());
        self.writes.lock().unwrap().push(cadence.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsWorkflowStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsWorkflowStore::new(dir.path(), "yml");
        (dir, store)
    }

    #[test]
    fn test_location_derived_from_cadence() {
        let store = FsWorkflowStore::new("/ci/workflows", "yml");
        assert_eq!(
            store.location(&CadenceKey::from("daily")),
            PathBuf::from("/ci/workflows/daily.yml")
        );
    }

    #[test]
    fn test_read_write_roundtrip_preserves_bytes() {
        let (_dir, store) = make_store();
        let cadence = CadenceKey::from("merged");
        let text = "# comment\r\njobs:\r\n  - build\r\n";
        store.write(&cadence, text).unwrap();
        assert_eq!(store.read(&cadence).unwrap(), text);
    }

    #[test]
    fn test_missing_file_is_reported_as_missing_workflow() {
        let (_dir, store) = make_store();
        let err = store.read(&CadenceKey::from("daily")).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingWorkflow { .. }));
        assert!(err.to_string().contains("daily.yml"));
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let (dir, store) = make_store();
        let cadence = CadenceKey::from("normal");
        std::fs::write(dir.path().join("normal.yml"), "old").unwrap();
        store.write(&cadence, "new").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("normal.yml")).unwrap(), "new");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = make_store();
        let path = dir.path().join("daily.yml");
        std::fs::write(&path, "jobs:\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.write(&CadenceKey::from("daily"), "jobs: []\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "jobs: []\n");
    }

    #[test]
    fn test_memory_store_records_writes() {
        let store = MemoryWorkflowStore::new().with_file("daily", "jobs:\n");
        assert_eq!(store.read(&CadenceKey::from("daily")).unwrap(), "jobs:\n");
        store.write(&CadenceKey::from("daily"), "jobs: []\n").unwrap();
        assert_eq!(store.get("daily").as_deref(), Some("jobs: []\n"));
        assert_eq!(store.writes(), vec![CadenceKey::from("daily")]);
        assert!(store.read(&CadenceKey::from("normal")).is_err());
    }
}
