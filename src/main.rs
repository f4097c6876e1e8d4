use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use freesia_engine::{Engine, EngineOptions};
use freesia_node::{NodeRegistry, RunInputs};
use freesia_nodes::register_builtins;
use freesia_workflow::WorkflowDef;

/// Freesia - a workflow automation engine
#[derive(Parser)]
#[command(name = "freesia")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a workflow
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to a run-inputs JSON file; otherwise inputs are read from stdin
    #[arg(long)]
    inputs: Option<PathBuf>,
  },

  /// Validate a workflow file without executing it
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      inputs,
    }) => {
      run_workflow(workflow_file, inputs)?;
    }
    Some(Commands::Validate { workflow_file }) => {
      validate_workflow(workflow_file)?;
    }
    None => {
      println!("freesia - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_workflow(workflow_file: PathBuf, inputs: Option<PathBuf>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(workflow_file, inputs).await })
}

async fn run_workflow_async(workflow_file: PathBuf, inputs: Option<PathBuf>) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  eprintln!("Loaded workflow with {} nodes", workflow.nodes.len());

  let run_inputs = match inputs {
    Some(path) => {
      let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read inputs file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse inputs file: {}", path.display()))?
    }
    None => read_inputs_from_stdin()?,
  };

  let mut registry = NodeRegistry::new();
  register_builtins(&mut registry);
  let engine = Engine::new(registry, EngineOptions::default());

  let cancel = CancellationToken::new();
  let report = engine
    .run_with_cancel(&workflow, run_inputs, cancel)
    .await
    .context("workflow execution failed")?;

  eprintln!(
    "Run {} finished: {:?} ({} nodes completed)",
    report.run_id,
    report.status,
    report.execution_path.len()
  );

  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}

fn validate_workflow(workflow_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let workflow = load_workflow(&workflow_file).await?;
    workflow.validate().context("invalid workflow structure")?;
    workflow
      .graph()
      .topological_order()
      .context("invalid workflow graph")?;
    eprintln!(
      "Workflow is valid: {} nodes, {} edges",
      workflow.nodes.len(),
      workflow.edges.len()
    );
    Ok(())
  })
}

async fn load_workflow(path: &PathBuf) -> Result<WorkflowDef> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

fn read_inputs_from_stdin() -> Result<RunInputs> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, run with no inputs
    Ok(RunInputs::default())
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read inputs from stdin")?;

    if input.trim().is_empty() {
      Ok(RunInputs::default())
    } else {
      serde_json::from_str(&input).context("failed to parse inputs JSON from stdin")
    }
  }
}
