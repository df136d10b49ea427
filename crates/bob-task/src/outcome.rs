use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;

/// What a task runner reports for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
  pub ok: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<StepError>,
}

impl StepOutcome {
  pub fn success(output: Value) -> Self {
    Self {
      ok: true,
      output: Some(output),
      error: None,
    }
  }

  pub fn empty() -> Self {
    Self {
      ok: true,
      output: None,
      error: None,
    }
  }

  pub fn failure(error: StepError) -> Self {
    Self {
      ok: false,
      output: None,
      error: Some(error),
    }
  }

  /// A failed outcome without an error still fails, with a generic message.
  pub fn into_result(self) -> Result<Option<Value>, StepError> {
    if self.ok {
      Ok(self.output)
    } else {
      Err(
        self
          .error
          .unwrap_or_else(|| StepError::execution("runner reported failure without an error")),
      )
    }
  }
}

/// Per-attempt information handed to the runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
  pub execution_id: String,
  /// 1-based attempt number.
  pub attempt: u32,
  /// Outputs of the step's direct dependencies, keyed by step id.
  pub upstream: BTreeMap<String, Value>,
}

/// Result of a verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub passed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

impl Verdict {
  pub fn pass() -> Self {
    Self {
      passed: true,
      detail: None,
    }
  }

  pub fn fail(detail: impl Into<String>) -> Self {
    Self {
      passed: false,
      detail: Some(detail.into()),
    }
  }
}
