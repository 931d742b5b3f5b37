//! Sandbox Matrix CLI
//!
//! The `sandbox-matrix` command assigns sandbox templates to parallel CI
//! executors and keeps workflow parallelism in sync with the catalog.
//!
//! ## Commands
//!
//! - `resolve`: print the template owned by this executor
//! - `check`: audit declared parallelism, fail on any mismatch
//! - `fix`: audit, then rewrite the mismatched declarations

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use sandbox_matrix_core::{
    AssignmentResolver, ExecutorCoordinates, MatrixConfig, MatrixError, SandboxDirectory,
    DEFAULT_CATALOG_FILE,
};
use sandbox_matrix_workflow::{
    apply_fixes, render_check_json, render_check_text, render_fix_json, render_fix_text,
    AuditScope, Auditor, FsWorkflowStore,
};

#[derive(Parser)]
#[command(name = "sandbox-matrix")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assign sandbox templates to CI executors and check workflow parallelism", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Catalog file
    #[arg(long, global = true, env = "SANDBOX_MATRIX_CATALOG", default_value = DEFAULT_CATALOG_FILE)]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the template this executor should run
    Resolve {
        /// Release cadence (e.g. normal, merged, daily)
        #[arg(long)]
        cadence: String,

        /// Task to resolve the template for
        #[arg(long)]
        task: String,

        /// Zero-based executor index
        #[arg(long, env = "CIRCLE_NODE_INDEX", default_value_t = 0)]
        index: usize,

        /// Executor count
        #[arg(long, env = "CIRCLE_NODE_TOTAL", default_value_t = 1)]
        total: usize,

        /// Directory of generated sandboxes (default: from the catalog file)
        #[arg(long, env = "SANDBOX_ROOT")]
        sandbox_root: Option<PathBuf>,

        /// Print the full assignment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check declared parallelism against the catalog
    Check(AuditArgs),

    /// Rewrite declared parallelism to match the catalog
    Fix(AuditArgs),
}

#[derive(Args)]
struct AuditArgs {
    /// Only this cadence
    #[arg(long)]
    cadence: Option<String>,

    /// Only this task
    #[arg(long)]
    task: Option<String>,

    /// Workflow directory (default: from the catalog file)
    #[arg(long)]
    workflows_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl AuditArgs {
    fn scope(&self) -> AuditScope {
        AuditScope {
            cadence: self.cadence.clone(),
            task: self.task.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sandbox_matrix_core::init_tracing(cli.json_logs, level);

    let config = MatrixConfig::load(&cli.catalog)
        .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))?;

    match cli.command {
        Commands::Resolve {
            cadence,
            task,
            index,
            total,
            sandbox_root,
            json,
        } => cmd_resolve(
            &config,
            &cadence,
            &task,
            ExecutorCoordinates::new(index, total),
            sandbox_root.as_deref(),
            json,
        ),
        Commands::Check(args) => cmd_check(&config, &args),
        Commands::Fix(args) => cmd_fix(&config, &args),
    }
}

fn workflow_store(config: &MatrixConfig, args: &AuditArgs) -> FsWorkflowStore {
    match &args.workflows_dir {
        Some(dir) => FsWorkflowStore::new(dir, &config.workflows.extension),
        None => FsWorkflowStore::from_settings(&config.workflows),
    }
}

/// Print the template for one executor
fn cmd_resolve(
    config: &MatrixConfig,
    cadence: &str,
    task: &str,
    coordinates: ExecutorCoordinates,
    sandbox_root: Option<&Path>,
    json: bool,
) -> Result<()> {
    let directory = SandboxDirectory::new(
        sandbox_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.sandboxes.dir.clone()),
    );

    let assignment = match AssignmentResolver::new(&config.catalog, &directory)
        .resolve(cadence, task, coordinates)
    {
        Ok(assignment) => assignment,
        Err(err @ MatrixError::ParallelismMismatch { .. }) => {
            return Err(match cadence_report(config, cadence) {
                Some(report) => anyhow::anyhow!("{err}\n{report}"),
                None => err.into(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&assignment)?);
    } else {
        println!("{}", assignment.template);
    }
    Ok(())
}

/// Check report for one cadence, or `None` when its workflow cannot be read.
fn cadence_report(config: &MatrixConfig, cadence: &str) -> Option<String> {
    let store = FsWorkflowStore::from_settings(&config.workflows);
    let scope = AuditScope {
        cadence: Some(cadence.to_string()),
        task: None,
    };
    match Auditor::new(&config.catalog).load_and_audit(&store, &scope) {
        Ok((_, report)) => Some(render_check_text(&report)),
        Err(e) => {
            warn!(cadence, error = %e, "Could not audit workflow for the error report");
            None
        }
    }
}

/// Audit the workflows and fail when any declaration is stale
fn cmd_check(config: &MatrixConfig, args: &AuditArgs) -> Result<()> {
    let store = workflow_store(config, args);
    info!(dir = %store.dir().display(), "Checking workflow parallelism");

    let (_, report) = Auditor::new(&config.catalog).load_and_audit(&store, &args.scope())?;

    if args.json {
        println!("{}", render_check_json(&report)?);
    } else {
        println!("{}", render_check_text(&report));
    }

    if report.is_consistent() {
        Ok(())
    } else {
        anyhow::bail!(
            "Parallelism check failed: {} mismatch(es), {} ambiguous job(s)",
            report.mismatches().len(),
            report.ambiguous_count()
        )
    }
}

/// Audit the workflows and rewrite every stale declaration
fn cmd_fix(config: &MatrixConfig, args: &AuditArgs) -> Result<()> {
    let store = workflow_store(config, args);
    info!(dir = %store.dir().display(), "Fixing workflow parallelism");

    let (workflows, report) = Auditor::new(&config.catalog).load_and_audit(&store, &args.scope())?;
    let summary = apply_fixes(&store, &workflows, &report)?;

    if args.json {
        println!("{}", render_fix_json(&report, &summary)?);
    } else {
        println!("{}", render_fix_text(&report, &summary));
    }

    if summary.is_complete() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} fix(es) could not be applied",
            summary.unresolved.len()
        )
    }
}
