use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Success,
  Failed,
  Skipped,
}

impl StepStatus {
  /// Terminal states never change again.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Success | Self::Failed | Self::Skipped)
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Success => "success",
      Self::Failed => "failed",
      Self::Skipped => "skipped",
    }
  }
}

impl fmt::Display for StepStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Outcome of the post-execution check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
  #[default]
  NotRun,
  Passed,
  Failed,
}

/// Why a step was never run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "step", rename_all = "snake_case")]
pub enum SkipReason {
  DependencyFailed(String),
  DependencySkipped(String),
  CriticalStepFailed(String),
  Cancelled,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DependencyFailed(id) => write!(f, "dependency {} failed", id),
      Self::DependencySkipped(id) => write!(f, "dependency {} was skipped", id),
      Self::CriticalStepFailed(id) => write!(f, "critical step {} failed", id),
      Self::Cancelled => f.write_str("run cancelled"),
    }
  }
}

/// A status change that would break monotonicity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step '{step_id}' cannot move from {from} to {to}")]
pub struct TransitionError {
  pub step_id: String,
  pub from: StepStatus,
  pub to: StepStatus,
}
