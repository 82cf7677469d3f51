use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use runnel_config::FlowDef;
use runnel_engine::{Engine, FlowEvent, FlowStatus, RunOptions};
use runnel_flow::{Flow, ValidateOptions, has_errors, validate_with};
use runnel_steps::builtin_registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runnel - run event-driven flows of steps from the command line
#[derive(Parser)]
#[command(name = "runnel")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a flow, reading the trigger payload from stdin
  Run {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,

    /// Trigger step to start from (default: the first trigger)
    #[arg(long)]
    trigger: Option<String>,

    /// Accept flows with cycles
    #[arg(long)]
    allow_cycles: bool,

    /// Run even if validation reports errors
    #[arg(long)]
    force: bool,
  },

  /// Validate a flow without running it
  Validate {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,

    /// Accept flows with cycles
    #[arg(long)]
    allow_cycles: bool,
  },

  /// List the available step types
  Steps,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      flow_file,
      trigger,
      allow_cycles,
      force,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_flow(flow_file, trigger, allow_cycles, force))?;
    }
    Some(Commands::Validate {
      flow_file,
      allow_cycles,
    }) => validate_flow(&flow_file, allow_cycles)?,
    Some(Commands::Steps) => list_steps(),
    None => {
      println!("runnel - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_flow(flow_file: &Path) -> Result<Flow> {
  let content = std::fs::read_to_string(flow_file)
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  let def = FlowDef::from_json(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))?;
  Flow::from_def(&def, &builtin_registry())
    .with_context(|| format!("failed to build flow '{}'", def.flow_id))
}

/// Print findings to stderr; returns whether any is an error.
fn report_findings(flow: &Flow, allow_cycles: bool) -> bool {
  let findings = validate_with(flow, ValidateOptions { allow_cycles });
  for finding in &findings {
    eprintln!("{}", finding);
  }
  has_errors(&findings)
}

fn validate_flow(flow_file: &Path, allow_cycles: bool) -> Result<()> {
  let flow = load_flow(flow_file)?;
  if report_findings(&flow, allow_cycles) {
    bail!("flow '{}' is invalid", flow.flow_id);
  }
  println!("flow '{}' is valid ({} steps, {} edges)", flow.flow_id, flow.len(), flow.edges().len());
  Ok(())
}

async fn run_flow(
  flow_file: PathBuf,
  trigger: Option<String>,
  allow_cycles: bool,
  force: bool,
) -> Result<()> {
  let flow = load_flow(&flow_file)?;
  if report_findings(&flow, allow_cycles) {
    if !force {
      bail!("flow '{}' is invalid, use --force to run it anyway", flow.flow_id);
    }
    warn!(flow_id = %flow.flow_id, "running a flow with validation errors");
  }

  let engine = Engine::new(flow);
  let trigger = match trigger {
    Some(id) => engine
      .flow()
      .step(&id)
      .with_context(|| format!("trigger '{}' not found in flow", id))?,
    None => engine.default_trigger()?,
  };
  let trigger_id = trigger.step_id.clone();

  let payload = read_payload_from_stdin()?;
  let initial_state = runnel_steps::seed::for_trigger(&trigger.step_type, &trigger.config, payload);

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling run");
      ctrl_c.cancel();
    }
  });

  let options = RunOptions::new()
    .with_state(initial_state)
    .with_cancel(cancel);
  let run = engine.run_with(&trigger_id, options)?;
  let state = run.state().clone();
  info!(run_id = %run.run_id(), trigger = %trigger_id, "run started");

  let mut status = FlowStatus::Failed;
  let mut events = std::pin::pin!(run.into_stream());
  let mut stdout = io::stdout().lock();
  while let Some(event) = events.next().await {
    if let FlowEvent::FlowCompleted { status: s, .. } = &event {
      status = *s;
    }
    writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
  }
  writeln!(stdout, "{}", serde_json::to_string_pretty(&state.snapshot())?)?;

  match status {
    FlowStatus::Succeeded => Ok(()),
    other => bail!("flow run {}", other),
  }
}

fn list_steps() {
  let registry = builtin_registry();
  for (tag, info) in registry.list() {
    println!("{:<20} {:<12} {}", tag, info.category.to_string(), info.description);
  }
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, run without a payload
    Ok(serde_json::Value::Null)
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::Value::Null)
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
