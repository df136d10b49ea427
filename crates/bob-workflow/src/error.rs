use thiserror::Error;

/// A workflow definition that cannot be executed.
///
/// These are the only errors raised before any step runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
  #[error("duplicate step id: {0}")]
  DuplicateStep(String),

  #[error("invalid step '{step_id}': {message}")]
  InvalidStep { step_id: String, message: String },

  #[error("step '{step_id}' depends on unknown step '{dependency}'")]
  UnknownDependency { step_id: String, dependency: String },

  #[error("dependency cycle detected: {}", cycle_path(.steps))]
  Cycle { steps: Vec<String> },

  #[error("invalid workflow setting: {0}")]
  InvalidSetting(String),
}

fn cycle_path(steps: &[String]) -> String {
  let mut path = steps.join(" -> ");
  if let Some(first) = steps.first() {
    path.push_str(" -> ");
    path.push_str(first);
  }
  path
}
