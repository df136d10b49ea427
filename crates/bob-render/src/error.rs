use std::path::PathBuf;

use bob_config::ConfigError;

use crate::artifact::RenderedArtifact;

/// Errors that can occur while rendering or writing an artifact.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
  /// Template syntax or evaluation failed in the first pass.
  #[error("failed to render template '{name}': {message}")]
  Template {
    name: String,
    line: Option<usize>,
    message: String,
  },

  /// The rendered header is not valid YAML. `rendered` holds the complete
  /// first-pass output so it can be inspected.
  #[error("invalid header after rendering{}: {message}", .line.map(|l| format!(" (line {})", l)).unwrap_or_default())]
  HeaderValidation {
    /// Line in the rendered text, 1-based.
    line: Option<usize>,
    message: String,
    rendered: Box<RenderedArtifact>,
  },

  #[error("io error at '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

impl RenderError {
  pub(crate) fn template(name: &str, err: minijinja::Error) -> Self {
    Self::Template {
      name: name.to_string(),
      line: err.line(),
      message: err.to_string(),
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
