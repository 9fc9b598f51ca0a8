//! `flowrun`: validate and run workflow graph files from the command
//! line.
//!
//! Graph files are JSON workflow snapshots.  `run` loads the target
//! file (plus any sub-workflows from `--workflows`) into an in-memory
//! repository, executes it, and prints the run report as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use capabilities::{DefaultInvoker, RemoteConfig};
use clap::{Parser, Subcommand};
use engine::{validate_graph, EngineConfig, Executor, Workflow};
use repository::InMemoryRepository;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowrun", about = "Workflow graph runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a workflow file for structural defects.
    Validate {
        /// Path to the workflow JSON file.
        file: PathBuf,
    },
    /// Execute a workflow file and print the run report.
    Run {
        /// Path to the workflow JSON file.
        file: PathBuf,

        /// Input payload as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Input payload read from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Directory of additional workflow files, made resolvable as
        /// sub-workflows.
        #[arg(long)]
        workflows: Option<PathBuf>,

        /// Maximum visits per node within one run.
        #[arg(long, default_value_t = 1)]
        max_visits: u32,

        /// Maximum sub-workflow nesting depth.
        #[arg(long, default_value_t = 16)]
        max_depth: u32,

        /// Abort the run after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Pretty-print the run report.
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { file } => validate(&file),
        Command::Run {
            file,
            input,
            input_file,
            workflows,
            max_visits,
            max_depth,
            timeout_secs,
            pretty,
        } => {
            run(
                &file,
                input,
                input_file,
                workflows,
                EngineConfig {
                    max_visits,
                    max_depth,
                },
                timeout_secs,
                pretty,
            )
            .await
        }
    }
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing workflow file {}", path.display()))
}

fn validate(file: &Path) -> Result<()> {
    let workflow = load_workflow(file)?;
    let start = validate_graph(&workflow).context("workflow graph is invalid")?;
    println!(
        "ok: '{}' v{} ({} nodes, {} edges, starts at '{}')",
        workflow.name,
        workflow.version,
        workflow.nodes.len(),
        workflow.edges.len(),
        start
    );
    Ok(())
}

fn load_input(input: Option<String>, input_file: Option<PathBuf>) -> Result<Value> {
    match (input, input_file) {
        (Some(raw), _) => serde_json::from_str(&raw).context("parsing --input JSON"),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading input file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing input file {}", path.display()))
        }
        (None, None) => Ok(Value::Object(Default::default())),
    }
}

/// Load every `.json` file in `dir` into the repository as a published
/// workflow.  Unparseable files are skipped with a warning rather than
/// aborting the run.
fn load_workflow_dir(repository: &InMemoryRepository, dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading workflow directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_workflow(&path) {
            Ok(workflow) => {
                debug!("loaded workflow '{}' from {}", workflow.name, path.display());
                repository
                    .insert_published(&workflow)
                    .with_context(|| format!("storing workflow from {}", path.display()))?;
            }
            Err(err) => warn!("skipping {}: {err:#}", path.display()),
        }
    }
    Ok(())
}

async fn run(
    file: &Path,
    input: Option<String>,
    input_file: Option<PathBuf>,
    workflows: Option<PathBuf>,
    config: EngineConfig,
    timeout_secs: Option<u64>,
    pretty: bool,
) -> Result<()> {
    let workflow = load_workflow(file)?;
    let payload = load_input(input, input_file)?;

    let repository = Arc::new(InMemoryRepository::new());
    if let Some(dir) = workflows {
        load_workflow_dir(&repository, &dir)?;
    }
    // The target itself is resolvable too, so self-referencing graphs
    // hit the recursion limit instead of a resolution failure.
    repository
        .insert_published(&workflow)
        .context("storing target workflow")?;

    let invoker = Arc::new(DefaultInvoker::new(RemoteConfig::default()));
    let executor = Executor::new(repository, invoker, config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });
    if let Some(secs) = timeout_secs {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("timeout of {secs}s reached, cancelling run");
            on_timeout.cancel();
        });
    }

    let report = executor
        .run_graph_cancellable(&workflow, payload, cancel)
        .await
        .context("workflow could not start")?;

    let rendered = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");

    if !report.succeeded() {
        bail!("run failed");
    }
    Ok(())
}
