use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::DocumentFormat;
use crate::step::StepDef;

/// A workflow definition before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  #[serde(default = "default_name")]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Default timeout for every step that does not declare its own.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Upper bound on steps running at once within a wave.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_concurrency: Option<usize>,
  pub steps: Vec<StepDef>,
}

impl WorkflowDef {
  /// Build a definition from a plain list of steps.
  pub fn from_steps(name: impl Into<String>, steps: Vec<StepDef>) -> Self {
    Self {
      name: name.into(),
      description: None,
      timeout_ms: None,
      max_concurrency: None,
      steps,
    }
  }

  /// Parse a definition document.
  ///
  /// Accepts either a bare list of steps or an object with a `steps` field.
  pub fn parse(text: &str, format: DocumentFormat) -> Result<Self, ConfigError> {
    let value = match format.parse(text)? {
      serde_json::Value::Array(steps) => serde_json::json!({ "steps": steps }),
      value @ serde_json::Value::Object(_) => value,
      other => {
        return Err(ConfigError::InvalidDefinition(format!(
          "expected a list of steps or an object, got {}",
          value_kind(&other)
        )));
      }
    };

    serde_json::from_value(value).map_err(|e| ConfigError::InvalidDefinition(e.to_string()))
  }

  /// Read and parse a definition file, picking the format from its extension.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let format = DocumentFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| {
      ConfigError::InvalidDefinition(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut def = Self::parse(&text, format)?;
    if def.name == default_name()
      && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    {
      def.name = stem.to_string();
    }
    Ok(def)
  }
}

fn default_name() -> String {
  "workflow".to_string()
}

fn value_kind(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "a boolean",
    serde_json::Value::Number(_) => "a number",
    serde_json::Value::String(_) => "a string",
    serde_json::Value::Array(_) => "a list",
    serde_json::Value::Object(_) => "an object",
  }
}
