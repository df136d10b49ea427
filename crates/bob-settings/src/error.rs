use std::path::PathBuf;

use bob_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
  /// The file on disk could not be parsed; nothing was merged or written.
  #[error("existing configuration at '{}' is malformed: {message}", .path.display())]
  MalformedExisting { path: PathBuf, message: String },

  #[error("io error at '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("preset '{name}' not found. Available: {}", .available.join(", "))]
  UnknownPreset {
    name: String,
    available: Vec<&'static str>,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

impl SettingsError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
