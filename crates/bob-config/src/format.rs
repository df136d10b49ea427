//! Structured document formats shared by workflow definitions and settings files.

use std::fmt;
use std::path::Path;

use crate::error::ConfigError;

/// On-disk format of a structured document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
  Json,
  Yaml,
}

impl DocumentFormat {
  /// Pick a format from a file extension.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let extension = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
      Some("json") => Ok(Self::Json),
      Some("yaml") | Some("yml") => Ok(Self::Yaml),
      _ => Err(ConfigError::UnsupportedFormat { extension }),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Json => "json",
      Self::Yaml => "yaml",
    }
  }

  /// Parse text into a generic value tree.
  pub fn parse(&self, text: &str) -> Result<serde_json::Value, ConfigError> {
    match self {
      Self::Json => serde_json::from_str(text).map_err(|e| ConfigError::Parse {
        format: self.name(),
        message: e.to_string(),
      }),
      Self::Yaml => serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
        format: self.name(),
        message: e.to_string(),
      }),
    }
  }

  /// Serialize a value tree. JSON is pretty-printed and newline-terminated.
  pub fn to_string(&self, value: &serde_json::Value) -> Result<String, ConfigError> {
    match self {
      Self::Json => serde_json::to_string_pretty(value)
        .map(|mut s| {
          s.push('\n');
          s
        })
        .map_err(|e| ConfigError::Serialize {
          format: self.name(),
          message: e.to_string(),
        }),
      Self::Yaml => serde_yaml::to_string(value).map_err(|e| ConfigError::Serialize {
        format: self.name(),
        message: e.to_string(),
      }),
    }
  }
}

impl fmt::Display for DocumentFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
