//! Template catalog: templates, cadences and tasks.
//!
//! The catalog is an immutable value built once per process run and passed
//! explicitly into every operation. Construction validates cross references
//! so that downstream code can index without re-checking.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MatrixError, Result};

/// Parallelism a CI job gets when its block declares none.
pub const DEFAULT_PARALLELISM: usize = 2;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
    };
}

string_key!(
    /// Unique template identifier, e.g. `react-vite/default-ts`.
    TemplateKey
);
string_key!(
    /// Cadence identifier, e.g. `daily`.
    CadenceKey
);
string_key!(
    /// Task identifier, e.g. `e2e-tests`.
    TaskKey
);

impl TemplateKey {
    /// Directory name a sandbox for this template is created under. Only
    /// the first `/` is replaced.
    pub fn sandbox_dir_name(&self) -> String {
        self.0.replacen('/', "-", 1)
    }
}

/// A schedulable test configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub key: TemplateKey,

    /// Excludes the template from every task.
    #[serde(default)]
    pub in_development: bool,

    /// Tasks this template never runs.
    #[serde(default)]
    pub skip_tasks: BTreeSet<TaskKey>,

    /// Eligibility for the type-check task.
    #[serde(default)]
    pub type_check: bool,
}

impl Template {
    pub fn new(key: impl Into<TemplateKey>) -> Self {
        Self {
            key: key.into(),
            in_development: false,
            skip_tasks: BTreeSet::new(),
            type_check: false,
        }
    }

    pub fn in_development(mut self) -> Self {
        self.in_development = true;
        self
    }

    pub fn skipping(mut self, task: impl Into<TaskKey>) -> Self {
        self.skip_tasks.insert(task.into());
        self
    }

    pub fn with_type_check(mut self) -> Self {
        self.type_check = true;
        self
    }
}

/// A CI run class and its ordered candidate templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    #[serde(rename = "name")]
    pub key: CadenceKey,

    /// Candidate order defines the executor index mapping.
    #[serde(default)]
    pub templates: Vec<TemplateKey>,
}

impl Cadence {
    pub fn new<I, K>(key: impl Into<CadenceKey>, templates: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TemplateKey>,
    {
        Self {
            key: key.into(),
            templates: templates.into_iter().map(Into::into).collect(),
        }
    }
}

/// A CI job family applied across templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "name")]
    pub key: TaskKey,

    /// Workflow job identifier this task runs as.
    pub job: String,

    /// Marks the static type-check task.
    #[serde(default)]
    pub type_check: bool,
}

impl Task {
    pub fn new(key: impl Into<TaskKey>, job: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            job: job.into(),
            type_check: false,
        }
    }

    pub fn type_check(mut self) -> Self {
        self.type_check = true;
        self
    }

    /// Built-in task table used when a catalog declares no tasks.
    pub fn builtin() -> Vec<Task> {
        vec![
            Task::new("sandbox", "create-sandboxes"),
            Task::new("build", "build-sandboxes"),
            Task::new("check-sandbox", "check-sandboxes").type_check(),
            Task::new("chromatic", "chromatic-sandboxes"),
            Task::new("e2e-tests", "e2e-production"),
            Task::new("e2e-tests-dev", "e2e-dev"),
            Task::new("test-runner", "test-runner-production"),
            Task::new("bench", "bench"),
            Task::new("vitest-integration", "vitest-integration"),
        ]
    }
}

/// Immutable view of all templates, cadences and tasks.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<Template>,
    index: HashMap<TemplateKey, usize>,
    cadences: Vec<Cadence>,
    tasks: Vec<Task>,
    default_parallelism: usize,
}

impl Catalog {
    /// Build a catalog, validating every cross reference.
    pub fn new(templates: Vec<Template>, cadences: Vec<Cadence>, tasks: Vec<Task>) -> Result<Self> {
        let mut index = HashMap::with_capacity(templates.len());
        for (position, template) in templates.iter().enumerate() {
            if index.insert(template.key.clone(), position).is_some() {
                return Err(MatrixError::DuplicateTemplate {
                    template: template.key.to_string(),
                    scope: "the template list".to_string(),
                });
            }
        }

        let tasks = if tasks.is_empty() {
            Task::builtin()
        } else {
            tasks
        };
        validate_tasks(&tasks)?;

        let task_keys: HashSet<&TaskKey> = tasks.iter().map(|t| &t.key).collect();
        for template in &templates {
            if let Some(unknown) = template.skip_tasks.iter().find(|t| !task_keys.contains(t)) {
                return Err(MatrixError::Config(format!(
                    "template \"{}\" skips unknown task \"{}\"",
                    template.key, unknown
                )));
            }
        }

        let mut cadence_keys = HashSet::new();
        for cadence in &cadences {
            if !cadence_keys.insert(&cadence.key) {
                return Err(MatrixError::Config(format!(
                    "cadence \"{}\" is declared more than once",
                    cadence.key
                )));
            }
            let mut seen = HashSet::new();
            for member in &cadence.templates {
                if !index.contains_key(member) {
                    return Err(MatrixError::UnknownTemplate {
                        template: member.to_string(),
                        referenced_by: format!("cadence \"{}\"", cadence.key),
                    });
                }
                if !seen.insert(member) {
                    return Err(MatrixError::DuplicateTemplate {
                        template: member.to_string(),
                        scope: format!("cadence \"{}\"", cadence.key),
                    });
                }
            }
        }

        Ok(Self {
            templates,
            index,
            cadences,
            tasks,
            default_parallelism: DEFAULT_PARALLELISM,
        })
    }

    /// Override the implicit parallelism of jobs without a declaration.
    pub fn with_default_parallelism(mut self, parallelism: usize) -> Self {
        self.default_parallelism = parallelism;
        self
    }

    pub fn default_parallelism(&self) -> usize {
        self.default_parallelism
    }

    /// All templates in declaration order.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn template(&self, key: &TemplateKey) -> Option<&Template> {
        self.index.get(key).map(|&position| &self.templates[position])
    }

    /// All cadences in declaration order.
    pub fn cadences(&self) -> &[Cadence] {
        &self.cadences
    }

    /// Look up a cadence by name.
    pub fn cadence(&self, name: &str) -> Result<&Cadence> {
        self.cadences
            .iter()
            .find(|c| c.key == *name)
            .ok_or_else(|| MatrixError::UnknownCadence {
                cadence: name.to_string(),
                known: self.cadences.iter().map(|c| c.key.to_string()).collect(),
            })
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Result<&Task> {
        self.tasks
            .iter()
            .find(|t| t.key == *name)
            .ok_or_else(|| MatrixError::UnknownTask {
                task: name.to_string(),
                known: self.tasks.iter().map(|t| t.key.to_string()).collect(),
            })
    }

    /// Templates flagged as in development, in declaration order.
    pub fn in_development(&self) -> Vec<&TemplateKey> {
        self.templates
            .iter()
            .filter(|t| t.in_development)
            .map(|t| &t.key)
            .collect()
    }
}

fn validate_tasks(tasks: &[Task]) -> Result<()> {
    let mut keys = HashSet::new();
    let mut jobs = HashSet::new();
    for task in tasks {
        if !keys.insert(&task.key) {
            return Err(MatrixError::Config(format!(
                "task \"{}\" is declared more than once",
                task.key
            )));
        }
        if task.job.trim().is_empty() {
            return Err(MatrixError::Config(format!(
                "task \"{}\" has an empty job name",
                task.key
            )));
        }
        if !jobs.insert(task.job.as_str()) {
            return Err(MatrixError::Config(format!(
                "job \"{}\" is mapped by more than one task",
                task.job
            )));
        }
    }
    if tasks.iter().filter(|t| t.type_check).count() > 1 {
        return Err(MatrixError::Config(
            "at most one task may be marked as the type-check task".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        Catalog::new(
            vec![
                Template::new("a").with_type_check(),
                Template::new("b").skipping("e2e-tests"),
                Template::new("c").in_development(),
            ],
            vec![Cadence::new("daily", ["a", "b", "c"])],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_builtin_tasks_used_when_none_declared() {
        let catalog = sample();
        assert_eq!(catalog.tasks().len(), 9);
        let check = catalog.task("check-sandbox").unwrap();
        assert!(check.type_check);
        assert_eq!(check.job, "check-sandboxes");
        assert_eq!(catalog.task("e2e-tests").unwrap().job, "e2e-production");
    }

    #[test]
    fn test_lookup_unknown_cadence_and_task() {
        let catalog = sample();
        assert!(matches!(
            catalog.cadence("weekly"),
            Err(MatrixError::UnknownCadence { .. })
        ));
        assert!(matches!(
            catalog.task("lint"),
            Err(MatrixError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_cadence_referencing_unknown_template_rejected() {
        let err = Catalog::new(
            vec![Template::new("a")],
            vec![Cadence::new("daily", ["a", "missing"])],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::UnknownTemplate { .. }));
    }

    #[test]
    fn test_duplicate_member_in_cadence_rejected() {
        let err = Catalog::new(
            vec![Template::new("a")],
            vec![Cadence::new("daily", ["a", "a"])],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateTemplate { .. }));
    }

    #[test]
    fn test_duplicate_template_key_rejected() {
        let err = Catalog::new(vec![Template::new("a"), Template::new("a")], vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateTemplate { .. }));
    }

    #[test]
    fn test_skip_of_unknown_task_rejected() {
        let err = Catalog::new(vec![Template::new("a").skipping("lint")], vec![], vec![])
            .unwrap_err();
        assert!(err.to_string().contains("unknown task \"lint\""));
    }

    #[test]
    fn test_two_type_check_tasks_rejected() {
        let err = Catalog::new(
            vec![],
            vec![],
            vec![
                Task::new("check", "check-job").type_check(),
                Task::new("lint", "lint-job").type_check(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::Config(_)));
    }

    #[test]
    fn test_in_development_listing() {
        let catalog = sample();
        let keys: Vec<&str> = catalog.in_development().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["c"]);
    }

    #[test]
    fn test_sandbox_dir_name() {
        let key = TemplateKey::from("react-vite/default-ts");
        assert_eq!(key.sandbox_dir_name(), "react-vite-default-ts");

        let nested = TemplateKey::from("bench/react-vite/default-ts");
        assert_eq!(nested.sandbox_dir_name(), "bench-react-vite/default-ts");
    }
}
