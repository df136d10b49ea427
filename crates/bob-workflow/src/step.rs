use bob_config::{Operation, StepDef, StepKind, VerificationRef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// A validated, immutable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub id: String,
  pub kind: StepKind,
  /// Dependencies with duplicates removed, in declared order.
  pub depends_on: Vec<String>,
  pub critical: bool,
  pub verification: Option<VerificationRef>,
  pub timeout_ms: Option<u64>,
  pub max_retry_attempts: u32,
}

impl Step {
  /// Check the parts of a step definition that serde cannot.
  pub(crate) fn from_def(def: StepDef) -> Result<Self, WorkflowError> {
    if def.id.trim().is_empty() {
      return Err(WorkflowError::InvalidStep {
        step_id: def.id,
        message: "step id must not be empty".to_string(),
      });
    }

    check_kind(&def.id, &def.kind)?;

    let mut depends_on: Vec<String> = Vec::with_capacity(def.depends_on.len());
    for dep in def.depends_on {
      if !depends_on.contains(&dep) {
        depends_on.push(dep);
      }
    }

    Ok(Self {
      id: def.id,
      kind: def.kind,
      depends_on,
      critical: def.critical,
      verification: def.verification,
      timeout_ms: def.timeout_ms,
      max_retry_attempts: def.max_retry_attempts.unwrap_or(0),
    })
  }

  pub fn is_agentic(&self) -> bool {
    matches!(self.kind, StepKind::Agentic { .. })
  }
}

fn check_kind(step_id: &str, kind: &StepKind) -> Result<(), WorkflowError> {
  let invalid = |message: &str| WorkflowError::InvalidStep {
    step_id: step_id.to_string(),
    message: message.to_string(),
  };

  match kind {
    StepKind::Agentic { prompt, tools, .. } => {
      if prompt.trim().is_empty() {
        return Err(invalid("agentic step needs a prompt"));
      }
      if tools.iter().any(|t| t.trim().is_empty()) {
        return Err(invalid("tool names must not be empty"));
      }
    }
    StepKind::Deterministic { operation } => match operation {
      Operation::MergeConfig { path, .. } if path.as_os_str().is_empty() => {
        return Err(invalid("merge_config needs a path"));
      }
      Operation::RenderTemplate {
        template, source, ..
      } => match (template, source) {
        (Some(_), Some(_)) => {
          return Err(invalid(
            "render_template takes either a template name or an inline source, not both",
          ));
        }
        (None, None) => {
          return Err(invalid("render_template needs a template name or an inline source"));
        }
        _ => {}
      },
      Operation::ApplyPreset { preset, .. } if preset.trim().is_empty() => {
        return Err(invalid("apply_preset needs a preset name"));
      }
      _ => {}
    },
  }

  Ok(())
}
