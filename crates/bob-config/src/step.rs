use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::AgentTarget;

/// A step as written in a workflow document.
///
/// ```json
/// {
///   "id": "merge-settings",
///   "kind": "deterministic",
///   "operation": { "op": "merge_config", "path": ".claude/settings.json", "proposed": {} },
///   "dependsOn": ["analyze"],
///   "critical": true,
///   "verification": { "check": "file_exists", "args": { "path": ".claude/settings.json" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
  pub id: String,
  #[serde(flatten)]
  pub kind: StepKind,
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub critical: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub verification: Option<VerificationRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepKind {
  /// A pure, predictable operation executed in-process.
  Deterministic { operation: Operation },
  /// Work delegated to an external reasoning process bounded to `tools`.
  Agentic {
    prompt: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    context: serde_json::Value,
  },
}

impl StepKind {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Deterministic { .. } => "deterministic",
      Self::Agentic { .. } => "agentic",
    }
  }
}

/// Deterministic operations understood by the built-in runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Operation {
  /// Merge `proposed` into the settings file at `path`.
  MergeConfig {
    path: PathBuf,
    proposed: serde_json::Value,
    #[serde(default = "default_prefer_existing")]
    prefer_existing: bool,
  },
  /// Render a template, either named (looked up in the templates directory)
  /// or inline, optionally writing the result to `output`.
  RenderTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    bindings: serde_json::Value,
  },
  /// Merge a named settings preset into an agent's settings file under `root`.
  ApplyPreset {
    preset: String,
    agent: AgentTarget,
    #[serde(default = "default_root")]
    root: PathBuf,
    #[serde(default = "default_prefer_existing")]
    prefer_existing: bool,
  },
  /// Return `value` unchanged.
  Echo {
    #[serde(default)]
    value: serde_json::Value,
  },
}

impl Operation {
  pub fn name(&self) -> &'static str {
    match self {
      Self::MergeConfig { .. } => "merge_config",
      Self::RenderTemplate { .. } => "render_template",
      Self::ApplyPreset { .. } => "apply_preset",
      Self::Echo { .. } => "echo",
    }
  }
}

/// Opaque reference to a post-execution check.
///
/// The engine never interprets it; the verifier does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRef {
  pub check: String,
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub args: serde_json::Value,
}

fn default_prefer_existing() -> bool {
  true
}

fn default_root() -> PathBuf {
  PathBuf::from(".")
}
