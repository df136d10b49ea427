//! Step failure taxonomy.

use serde::{Deserialize, Serialize};

/// Why a step ended in `Failed`.
///
/// Captured into the step's result; never propagated out of the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepError {
  /// The task runner raised or reported failure.
  #[error("step execution failed: {message}")]
  Execution { message: String },

  /// The runner or verifier did not answer within the step timeout.
  #[error("step timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The step ran but did not achieve its objective.
  #[error("verification failed: {detail}")]
  VerificationFailed { detail: String },

  /// An existing configuration file could not be parsed; nothing was merged.
  #[error("existing configuration at '{path}' is malformed: {message}")]
  MalformedExistingConfig { path: String, message: String },

  /// A rendered artifact's header is not valid structured data.
  #[error("rendered header is invalid: {message}")]
  HeaderValidation { message: String },
}

impl StepError {
  pub fn execution(message: impl Into<String>) -> Self {
    Self::Execution {
      message: message.into(),
    }
  }

  /// Execution failures include timeouts.
  pub fn is_execution_failure(&self) -> bool {
    matches!(self, Self::Execution { .. } | Self::Timeout { .. })
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout { .. })
  }

  /// Whether another attempt could change the outcome.
  pub fn is_retryable(&self) -> bool {
    self.is_execution_failure()
  }
}

/// The task runner could not be brought up for a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error("task runner unavailable: {0}")]
  Unavailable(String),
}
