//! Step and workflow results.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::outcome::Verdict;
use crate::status::{SkipReason, StepStatus, TransitionError, VerificationStatus};

/// Outcome of attempting a single step.
///
/// Only the transition methods change `status`, and each rejects a move that
/// would leave a terminal state or skip `Running`. `error` is present exactly
/// when the step failed and `skip_reason` exactly when it was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
  step_id: String,
  critical: bool,
  status: StepStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  error: Option<StepError>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  skip_reason: Option<SkipReason>,
  #[serde(default)]
  verification: VerificationStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  verification_detail: Option<String>,
  #[serde(default)]
  attempts: u32,
}

impl StepResult {
  pub fn pending(step_id: impl Into<String>, critical: bool) -> Self {
    Self {
      step_id: step_id.into(),
      critical,
      status: StepStatus::Pending,
      output: None,
      error: None,
      skip_reason: None,
      verification: VerificationStatus::NotRun,
      verification_detail: None,
      attempts: 0,
    }
  }

  pub fn step_id(&self) -> &str {
    &self.step_id
  }

  pub fn critical(&self) -> bool {
    self.critical
  }

  pub fn status(&self) -> StepStatus {
    self.status
  }

  pub fn output(&self) -> Option<&Value> {
    self.output.as_ref()
  }

  pub fn error(&self) -> Option<&StepError> {
    self.error.as_ref()
  }

  pub fn skip_reason(&self) -> Option<&SkipReason> {
    self.skip_reason.as_ref()
  }

  pub fn verification(&self) -> VerificationStatus {
    self.verification
  }

  pub fn verification_detail(&self) -> Option<&str> {
    self.verification_detail.as_deref()
  }

  /// Number of runner invocations made.
  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  pub fn is_success(&self) -> bool {
    self.status == StepStatus::Success
  }

  fn transition(&mut self, from: StepStatus, to: StepStatus) -> Result<(), TransitionError> {
    if self.status != from {
      return Err(TransitionError {
        step_id: self.step_id.clone(),
        from: self.status,
        to,
      });
    }
    self.status = to;
    Ok(())
  }

  /// `Pending -> Running`.
  pub fn start(&mut self) -> Result<(), TransitionError> {
    self.transition(StepStatus::Pending, StepStatus::Running)
  }

  /// Record how many runner invocations were made. Only valid while running.
  pub fn record_attempts(&mut self, attempts: u32) -> Result<(), TransitionError> {
    self.require_running()?;
    self.attempts = attempts;
    Ok(())
  }

  /// Record the verifier's verdict. Only valid while running.
  pub fn record_verdict(&mut self, verdict: &Verdict) -> Result<(), TransitionError> {
    self.require_running()?;
    self.verification = if verdict.passed {
      VerificationStatus::Passed
    } else {
      VerificationStatus::Failed
    };
    self.verification_detail = verdict.detail.clone();
    Ok(())
  }

  /// Keep the runner's output, even if the step later fails verification.
  pub fn record_output(&mut self, output: Option<Value>) -> Result<(), TransitionError> {
    self.require_running()?;
    self.output = output;
    Ok(())
  }

  /// `Running -> Success`.
  pub fn succeed(&mut self) -> Result<(), TransitionError> {
    self.transition(StepStatus::Running, StepStatus::Success)
  }

  /// `Running -> Failed`.
  pub fn fail(&mut self, error: StepError) -> Result<(), TransitionError> {
    self.transition(StepStatus::Running, StepStatus::Failed)?;
    self.error = Some(error);
    Ok(())
  }

  /// `Pending -> Skipped`.
  pub fn skip(&mut self, reason: SkipReason) -> Result<(), TransitionError> {
    self.transition(StepStatus::Pending, StepStatus::Skipped)?;
    self.skip_reason = Some(reason);
    Ok(())
  }

  fn require_running(&self) -> Result<(), TransitionError> {
    if self.status == StepStatus::Running {
      Ok(())
    } else {
      Err(TransitionError {
        step_id: self.step_id.clone(),
        from: self.status,
        to: StepStatus::Running,
      })
    }
  }

  fn summary(&self) -> Option<String> {
    match self.status {
      StepStatus::Failed => self.error.as_ref().map(|e| e.to_string()),
      StepStatus::Skipped => self.skip_reason.as_ref().map(|r| r.to_string()),
      StepStatus::Success if self.verification == VerificationStatus::Passed => {
        Some("verified".to_string())
      }
      _ => None,
    }
  }
}

/// Result of a complete workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunResult {
  pub execution_id: String,
  pub workflow: String,
  /// True iff every critical step reached `Success`.
  pub success: bool,
  /// An external cancellation stopped the run.
  pub cancelled: bool,
  /// All steps, in execution order.
  pub steps: Vec<StepResult>,
}

impl WorkflowRunResult {
  pub fn new(
    execution_id: impl Into<String>,
    workflow: impl Into<String>,
    steps: Vec<StepResult>,
    cancelled: bool,
  ) -> Self {
    let success = steps
      .iter()
      .filter(|s| s.critical)
      .all(StepResult::is_success);

    Self {
      execution_id: execution_id.into(),
      workflow: workflow.into(),
      success,
      cancelled,
      steps,
    }
  }

  /// Get a step's result by id.
  pub fn get(&self, step_id: &str) -> Option<&StepResult> {
    self.steps.iter().find(|s| s.step_id == step_id)
  }

  pub fn count(&self, status: StepStatus) -> usize {
    self.steps.iter().filter(|s| s.status == status).count()
  }

  /// Human-readable per-step summary.
  pub fn report(&self) -> String {
    let mut out = String::new();
    let verdict = match (self.success, self.cancelled) {
      (_, true) => "cancelled",
      (true, false) => "succeeded",
      (false, false) => "failed",
    };
    let _ = writeln!(
      out,
      "workflow '{}' {} (execution {})",
      self.workflow, verdict, self.execution_id
    );

    let width = self
      .steps
      .iter()
      .map(|s| s.step_id.len())
      .max()
      .unwrap_or(0);

    for step in &self.steps {
      let marker = if step.critical { "*" } else { " " };
      let _ = write!(
        out,
        "  {}{:<width$}  {:<7}",
        marker,
        step.step_id,
        step.status.name(),
        width = width
      );
      if let Some(summary) = step.summary() {
        let _ = write!(out, "  {}", summary);
      }
      out.push('\n');
    }

    let _ = writeln!(
      out,
      "{} succeeded, {} failed, {} skipped",
      self.count(StepStatus::Success),
      self.count(StepStatus::Failed),
      self.count(StepStatus::Skipped)
    );
    out
  }
}
