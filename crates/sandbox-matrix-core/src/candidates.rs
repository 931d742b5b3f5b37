//! Candidate sources: where the pre-filter template list comes from.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::{Catalog, TemplateKey};
use crate::error::Result;

/// Supplies the ordered candidate templates for a cadence.
pub trait CandidateSource {
    fn candidates(&self, catalog: &Catalog, cadence: &str) -> Result<Vec<TemplateKey>>;
}

/// Candidates are the cadence's declared members.
#[derive(Debug, Clone, Copy, Default)]
pub struct CadenceMembership;

impl CandidateSource for CadenceMembership {
    fn candidates(&self, catalog: &Catalog, cadence: &str) -> Result<Vec<TemplateKey>> {
        Ok(catalog.cadence(cadence)?.templates.clone())
    }
}

/// Candidates are the sandboxes already present on disk.
///
/// Each directory under `root` is matched to the template whose key, with
/// `/` replaced by `-`, equals the directory name. Matches are returned in
/// catalog order. A missing root, or a root with no matching directories,
/// falls back to cadence membership.
#[derive(Debug, Clone)]
pub struct SandboxDirectory {
    root: PathBuf,
}

impl SandboxDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory_names(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

impl CandidateSource for SandboxDirectory {
    fn candidates(&self, catalog: &Catalog, cadence: &str) -> Result<Vec<TemplateKey>> {
        // Validate the cadence even when the directory listing wins.
        let membership = CadenceMembership.candidates(catalog, cadence)?;

        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "Sandbox directory absent, using cadence membership");
            return Ok(membership);
        }

        let names = self.directory_names()?;
        let present: Vec<TemplateKey> = catalog
            .templates()
            .iter()
            .filter(|t| names.contains(&t.key.sandbox_dir_name()))
            .map(|t| t.key.clone())
            .collect();

        if present.is_empty() {
            debug!(root = %self.root.display(), "No sandboxes match the catalog, using cadence membership");
            return Ok(membership);
        }

        info!(
            root = %self.root.display(),
            sandboxes = present.len(),
            "Using local sandboxes as candidates"
        );
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Cadence, Template};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                Template::new("react-vite/default-ts"),
                Template::new("angular-cli/default-ts"),
                Template::new("svelte-kit/skeleton-ts"),
            ],
            vec![Cadence::new(
                "normal",
                ["svelte-kit/skeleton-ts", "react-vite/default-ts"],
            )],
            vec![],
        )
        .unwrap()
    }

    fn keys(selected: &[TemplateKey]) -> Vec<&str> {
        selected.iter().map(|k| k.as_str()).collect()
    }

    #[test]
    fn test_cadence_membership() {
        let got = CadenceMembership.candidates(&catalog(), "normal").unwrap();
        assert_eq!(
            keys(&got),
            vec!["svelte-kit/skeleton-ts", "react-vite/default-ts"]
        );
    }

    #[test]
    fn test_missing_root_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = SandboxDirectory::new(dir.path().join("sandbox"));
        let got = source.candidates(&catalog(), "normal").unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn test_directories_replace_membership_in_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("angular-cli-default-ts")).unwrap();
        std::fs::create_dir(dir.path().join("react-vite-default-ts")).unwrap();
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();
        std::fs::write(dir.path().join("svelte-kit-skeleton-ts"), b"not a dir").unwrap();

        let source = SandboxDirectory::new(dir.path());
        let got = source.candidates(&catalog(), "normal").unwrap();
        assert_eq!(
            keys(&got),
            vec!["react-vite/default-ts", "angular-cli/default-ts"]
        );
    }

    #[test]
    fn test_no_matching_directories_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();

        let source = SandboxDirectory::new(dir.path());
        let got = source.candidates(&catalog(), "normal").unwrap();
        assert_eq!(
            keys(&got),
            vec!["svelte-kit/skeleton-ts", "react-vite/default-ts"]
        );
    }

    #[test]
    fn test_unknown_cadence_rejected_even_with_sandboxes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("react-vite-default-ts")).unwrap();
        let source = SandboxDirectory::new(dir.path());
        assert!(source.candidates(&catalog(), "weekly").is_err());
    }
}
