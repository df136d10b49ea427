//! Two-pass template rendering.
//!
//! # Flow
//! 1. Render the whole template, header included, as plain text against the
//!    bindings.
//! 2. Re-extract the header from the rendered text and check it parses as
//!    YAML. The header is only validated, never rewritten.
//!
//! Headers are written as YAML front matter:
//! ```text
//! ---
//! description: Rules for {{ project_name }}
//! alwaysApply: true
//! ---
//! # {{ project_name }}
//! ```
//!
//! Templates see only the bindings they are given. Nothing from the clock,
//! the environment or a random source is exposed, so the same template and
//! bindings always produce the same bytes.

use std::path::{Path, PathBuf};

use minijinja::{Environment, Value};
use tracing::debug;

use crate::artifact::RenderedArtifact;
use crate::error::RenderError;

const INLINE_NAME: &str = "<inline>";

/// Renders named templates from a directory, or inline sources.
pub struct TemplateRenderer {
  env: Environment<'static>,
  dir: Option<PathBuf>,
}

impl TemplateRenderer {
  /// A renderer that loads named templates from `dir`.
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    let mut env = environment();
    env.set_loader(minijinja::path_loader(dir.clone()));
    Self {
      env,
      dir: Some(dir),
    }
  }

  /// A renderer for inline sources only.
  pub fn inline() -> Self {
    Self {
      env: environment(),
      dir: None,
    }
  }

  pub fn templates_dir(&self) -> Option<&Path> {
    self.dir.as_deref()
  }

  /// Render the template called `name` from the templates directory.
  pub fn render_named(
    &self,
    name: &str,
    bindings: &serde_json::Value,
  ) -> Result<RenderedArtifact, RenderError> {
    let template = self
      .env
      .get_template(name)
      .map_err(|e| RenderError::template(name, e))?;
    let text = template
      .render(Value::from_serialize(bindings))
      .map_err(|e| RenderError::template(name, e))?;

    debug!(template = %name, bytes = text.len(), "template_rendered");
    validate_header(text)
  }

  /// Render an in-memory template.
  pub fn render_str(
    &self,
    source: &str,
    bindings: &serde_json::Value,
  ) -> Result<RenderedArtifact, RenderError> {
    let text = self
      .env
      .render_str(source, Value::from_serialize(bindings))
      .map_err(|e| RenderError::template(INLINE_NAME, e))?;

    debug!(template = INLINE_NAME, bytes = text.len(), "template_rendered");
    validate_header(text)
  }
}

fn environment() -> Environment<'static> {
  let mut env = Environment::new();
  env.set_trim_blocks(true);
  env.set_lstrip_blocks(true);
  env
}

/// Second pass: check the header of already-rendered text.
pub fn validate_header(text: String) -> Result<RenderedArtifact, RenderError> {
  let artifact = RenderedArtifact::split(text);

  let Some(header) = artifact.header.as_deref() else {
    return Ok(artifact);
  };

  match serde_yaml::from_str::<serde_yaml::Value>(header) {
    Ok(_) => Ok(artifact),
    Err(e) => {
      let line = match (e.location(), artifact.header_first_line()) {
        (Some(location), Some(first)) => Some(first + location.line() - 1),
        _ => None,
      };
      Err(RenderError::HeaderValidation {
        line,
        message: e.to_string(),
        rendered: Box::new(artifact),
      })
    }
  }
}
