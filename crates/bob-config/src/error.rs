use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to parse {format} document: {message}")]
  Parse {
    format: &'static str,
    message: String,
  },

  #[error("failed to serialize {format} document: {message}")]
  Serialize {
    format: &'static str,
    message: String,
  },

  #[error("unsupported document extension: {extension:?} (expected .json, .yaml or .yml)")]
  UnsupportedFormat { extension: Option<String> },

  #[error("invalid workflow definition: {0}")]
  InvalidDefinition(String),

  #[error("unsupported agent type: {name}. Supported: {}", .supported.join(", "))]
  UnsupportedAgent {
    name: String,
    supported: Vec<&'static str>,
  },

  #[error("invalid target directory '{}': {message}", .path.display())]
  InvalidTarget { path: PathBuf, message: String },
}
