use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bob_config::{AgentTarget, DocumentFormat, WorkflowDef};
use bob_engine::{
  BuiltinRunner, BuiltinVerifier, CommandRunner, ExecutorConfig, NoAgentRunner, WorkflowExecutor,
};
use bob_render::{RenderError, TemplateRenderer, rules};
use bob_settings::{
  FsSettingsStore, MergePolicy, SettingsError, merge_file, plan_merge, preserve_malformed, preset,
};
use bob_task::TaskRunner;
use bob_workflow::Workflow;

/// Bob - runs coding-agent setup workflows of deterministic and agentic steps
#[derive(Parser)]
#[command(name = "bob")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.bob)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// More output (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Run {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,

    /// Directory that relative paths in operations resolve against
    #[arg(long, default_value = ".")]
    target: PathBuf,

    /// Program that runs agentic steps
    #[arg(long)]
    agent_command: Option<String>,

    /// Argument passed to the agent command (repeatable)
    #[arg(long = "agent-arg", requires = "agent_command")]
    agent_args: Vec<String>,

    /// Default step timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum steps running at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the run result as JSON
    #[arg(long)]
    json: bool,
  },

  /// Print the execution order of a workflow
  Plan {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,
  },

  /// Merge a proposed configuration into an existing file
  Merge {
    /// File to merge into (created when missing)
    existing: PathBuf,

    /// File holding the proposed configuration
    proposed: PathBuf,

    /// Take proposed scalars over existing ones
    #[arg(long)]
    prefer_proposed: bool,

    /// Move an unparseable existing file aside and merge from scratch
    #[arg(long)]
    preserve_malformed: bool,

    /// Print the merged tree without writing
    #[arg(long)]
    dry_run: bool,
  },

  /// Render a template file
  Render {
    /// Path to the template
    template: PathBuf,

    /// Binding as key=value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// JSON or YAML file with bindings
    #[arg(long = "vars", value_name = "FILE")]
    vars_file: Option<PathBuf>,

    /// Write the output here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
  },

  /// Generate agent rules into a target directory
  GenerateRules {
    #[arg(long, default_value = "claude-code")]
    agent: AgentTarget,

    #[arg(long, default_value = ".")]
    target: PathBuf,

    /// Template name under the data directory's templates
    #[arg(long)]
    template: Option<String>,

    /// Write the rules here instead of the agent's default path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Binding as key=value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Print the rules without writing
    #[arg(long)]
    dry_run: bool,
  },

  /// List configuration presets
  Presets,

  /// Merge a preset into an agent's settings
  ApplyPreset {
    name: String,

    #[arg(long, default_value = "claude-code")]
    agent: AgentTarget,

    #[arg(long, default_value = ".")]
    target: PathBuf,

    /// Take preset scalars over existing ones
    #[arg(long)]
    prefer_proposed: bool,
  },

  /// Print the version
  Version,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".bob"),
  };

  let rt = tokio::runtime::Runtime::new()?;

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      target,
      agent_command,
      agent_args,
      timeout_ms,
      concurrency,
      json,
    }) => {
      let agent = agent_command.map(|program| CommandRunner::new(program).args(agent_args));
      let mut config = ExecutorConfig::default();
      if let Some(ms) = timeout_ms {
        config.default_timeout = std::time::Duration::from_millis(ms);
      }
      if let Some(n) = concurrency {
        config.max_concurrency = n;
      }
      rt.block_on(run_workflow(
        &workflow_file,
        &target,
        &data_dir,
        agent,
        config,
        json,
      ))
    }
    Some(Commands::Plan { workflow_file }) => {
      plan_workflow(&workflow_file)?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Merge {
      existing,
      proposed,
      prefer_proposed,
      preserve_malformed,
      dry_run,
    }) => {
      rt.block_on(merge_files(
        &existing,
        &proposed,
        policy(prefer_proposed),
        preserve_malformed,
        dry_run,
      ))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Render {
      template,
      vars,
      vars_file,
      out,
    }) => {
      rt.block_on(render_template(
        &template,
        &vars,
        vars_file.as_deref(),
        out.as_deref(),
      ))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::GenerateRules {
      agent,
      target,
      template,
      output,
      vars,
      dry_run,
    }) => {
      rt.block_on(generate_rules(
        agent,
        &target,
        &data_dir,
        template.as_deref(),
        output.as_deref(),
        &vars,
        dry_run,
      ))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Presets) => {
      list_presets();
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::ApplyPreset {
      name,
      agent,
      target,
      prefer_proposed,
    }) => {
      rt.block_on(apply_preset(&name, agent, &target, policy(prefer_proposed)))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Version) => {
      println!("bob {}", env!("CARGO_PKG_VERSION"));
      Ok(ExitCode::SUCCESS)
    }
    None => {
      println!("bob - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
    .with_writer(std::io::stderr)
    .init();
}

fn policy(prefer_proposed: bool) -> MergePolicy {
  if prefer_proposed {
    MergePolicy::prefer_proposed()
  } else {
    MergePolicy::prefer_existing()
  }
}

fn load_workflow(workflow_file: &Path) -> Result<Workflow> {
  let def = WorkflowDef::load(workflow_file)
    .with_context(|| format!("failed to load workflow file: {}", workflow_file.display()))?;
  Workflow::build(def).context("invalid workflow")
}

async fn run_workflow(
  workflow_file: &Path,
  target: &Path,
  data_dir: &Path,
  agent: Option<CommandRunner>,
  config: ExecutorConfig,
  json: bool,
) -> Result<ExitCode> {
  let workflow = load_workflow(workflow_file)?;
  eprintln!("Loaded workflow '{}' with {} steps", workflow.name, workflow.len());

  let templates_dir = data_dir.join("templates");
  let runner: Arc<dyn TaskRunner> = match agent {
    Some(agent) => Arc::new(with_templates(
      BuiltinRunner::new(agent.working_dir(target), target),
      &templates_dir,
    )),
    None => Arc::new(with_templates(
      BuiltinRunner::new(NoAgentRunner, target),
      &templates_dir,
    )),
  };
  let executor = WorkflowExecutor::new(runner, Arc::new(BuiltinVerifier::new(target)), config);

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupted, letting running steps finish");
      on_interrupt.cancel();
    }
  });

  let result = executor
    .execute(&workflow, cancel)
    .await
    .context("workflow execution failed")?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
  } else {
    print!("{}", result.report());
  }

  if result.success && !result.cancelled {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::FAILURE)
  }
}

fn with_templates<A: TaskRunner>(runner: BuiltinRunner<A>, dir: &Path) -> BuiltinRunner<A> {
  if dir.is_dir() {
    runner.with_templates(dir)
  } else {
    runner
  }
}

fn plan_workflow(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  println!("{}", workflow.name);
  for (i, step) in workflow.ordered_steps().enumerate() {
    let critical = if step.critical { " (critical)" } else { "" };
    if step.depends_on.is_empty() {
      println!("{:>3}. {} [{}]{}", i + 1, step.id, step.kind.name(), critical);
    } else {
      println!(
        "{:>3}. {} [{}]{} after {}",
        i + 1,
        step.id,
        step.kind.name(),
        critical,
        step.depends_on.join(", ")
      );
    }
  }
  Ok(())
}

async fn merge_files(
  existing: &Path,
  proposed: &Path,
  policy: MergePolicy,
  preserve: bool,
  dry_run: bool,
) -> Result<()> {
  let proposed = read_document(proposed).await?;
  let store = FsSettingsStore::new();

  if dry_run {
    let report = plan_merge(&store, existing, &proposed, policy).await?;
    println!("{}", serde_json::to_string_pretty(&report.merged)?);
    return Ok(());
  }

  let report = match merge_file(&store, existing, &proposed, policy).await {
    Err(SettingsError::MalformedExisting { .. }) if preserve => {
      let moved = preserve_malformed(existing).await?;
      eprintln!("Moved malformed file to {}", moved.display());
      merge_file(&store, existing, &proposed, policy).await?
    }
    other => other?,
  };

  let summary = match (report.created, report.changed) {
    (true, _) => "created",
    (false, true) => "updated",
    (false, false) => "unchanged",
  };
  eprintln!("{} {}", report.path.display(), summary);
  Ok(())
}

async fn render_template(
  template: &Path,
  vars: &[String],
  vars_file: Option<&Path>,
  out: Option<&Path>,
) -> Result<()> {
  let mut bindings = match vars_file {
    Some(path) => read_document(path).await?,
    None => Value::Object(Default::default()),
  };
  apply_vars(&mut bindings, vars)?;

  let name = template
    .file_name()
    .and_then(|n| n.to_str())
    .with_context(|| format!("invalid template path: {}", template.display()))?;
  let dir = template
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(Path::new("."));

  let renderer = TemplateRenderer::new(dir);
  let artifact = renderer
    .render_named(name, &bindings)
    .map_err(show_rendered)?;

  match out {
    Some(path) => {
      tokio::fs::write(path, &artifact.text)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
      eprintln!("Wrote {}", path.display());
    }
    None => print!("{}", artifact.text),
  }
  Ok(())
}

async fn generate_rules(
  agent: AgentTarget,
  target: &Path,
  data_dir: &Path,
  template: Option<&str>,
  output: Option<&Path>,
  vars: &[String],
  dry_run: bool,
) -> Result<()> {
  let mut bindings = Value::Object(Default::default());
  if let (Some(output), Value::Object(map)) = (output, &mut bindings) {
    map.insert(
      "output_file".to_string(),
      Value::String(output.display().to_string()),
    );
  }
  apply_vars(&mut bindings, vars)?;

  let renderer = match template {
    Some(_) => TemplateRenderer::new(data_dir.join("templates")),
    None => TemplateRenderer::inline(),
  };

  if dry_run {
    let artifact =
      rules::render_rules(&renderer, template, agent, &bindings).map_err(show_rendered)?;
    eprintln!(
      "Would write {}",
      rules::rules_path(agent, target, output).display()
    );
    print!("{}", artifact.text);
    return Ok(());
  }

  let (path, _) = rules::generate_rules(&renderer, template, agent, target, output, &bindings)
    .await
    .map_err(show_rendered)?;
  eprintln!("Wrote {} rules to {}", agent, path.display());
  Ok(())
}

fn list_presets() {
  for preset in preset::list() {
    println!("{}", preset.name);
    println!("  {}", preset.description);
    println!("  Best for: {}", preset.best_for);
  }
}

async fn apply_preset(
  name: &str,
  agent: AgentTarget,
  target: &Path,
  policy: MergePolicy,
) -> Result<()> {
  let found = preset::get(name)?;
  let store = FsSettingsStore::new();
  let report = preset::apply(&store, &found, agent, target, policy).await?;
  eprintln!(
    "Applied preset '{}' to {}{}",
    found.name,
    report.path.display(),
    if report.changed { "" } else { " (unchanged)" }
  );
  Ok(())
}

/// Read a JSON or YAML document, picking the format from the extension.
async fn read_document(path: &Path) -> Result<Value> {
  let format = DocumentFormat::from_path(path)?;
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;
  format
    .parse(&text)
    .with_context(|| format!("failed to parse {}", path.display()))
}

/// Apply `key=value` pairs on top of `bindings`. Values stay strings.
fn apply_vars(bindings: &mut Value, vars: &[String]) -> Result<()> {
  let Value::Object(map) = bindings else {
    bail!("bindings must be a map");
  };
  for var in vars {
    let Some((key, value)) = var.split_once('=') else {
      bail!("expected KEY=VALUE, got '{}'", var);
    };
    map.insert(key.trim().to_string(), Value::String(value.to_string()));
  }
  Ok(())
}

/// Print the first-pass output of a header failure before reporting it.
fn show_rendered(err: RenderError) -> anyhow::Error {
  if let RenderError::HeaderValidation { rendered, .. } = &err {
    eprintln!("--- rendered output ---\n{}", rendered.text);
  }
  err.into()
}
