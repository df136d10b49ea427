//! Agent rules generation.

use std::path::{Path, PathBuf};

use bob_config::{AgentTarget, validate_target_dir};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::info;

use crate::artifact::RenderedArtifact;
use crate::error::RenderError;
use crate::renderer::TemplateRenderer;

/// Template used when no named rules template is given.
///
/// Cursor rules carry a YAML header; Claude Code rules are plain markdown.
pub const DEFAULT_RULES_TEMPLATE: &str = r#"{% if agent_type == "cursor" %}
---
description: Coding agent rules for {{ project_name | default("this project") }}
globs: "{{ globs | default("**/*") }}"
alwaysApply: true
---
{% endif %}
# Coding agent rules{{ " for " ~ project_name if project_name else "" }}

## Workflow
- Read the relevant code before changing it.
- Keep changes small and focused; run the tests after every change.
{% if test_command %}
- Test command: `{{ test_command }}`
{% endif %}
{% if lint_command %}
- Lint command: `{{ lint_command }}`
{% endif %}

## Conventions
{% for rule in conventions | default([]) %}
- {{ rule }}
{% else %}
- Follow the conventions already present in the code base.
{% endfor %}

_Generated for {{ agent_type }} into `{{ output_file }}`._
"#;

/// Bindings for a rules template: the agent's variables, overridden by
/// `bindings` where both define a key.
pub fn rules_bindings(agent: AgentTarget, bindings: &Value) -> Value {
  let mut vars: Map<String, Value> = agent.template_variables();
  if let Value::Object(overrides) = bindings {
    for (key, value) in overrides {
      vars.insert(key.clone(), value.clone());
    }
  }
  Value::Object(vars)
}

/// Render rules for `agent`, from the named template or the built-in default.
pub fn render_rules(
  renderer: &TemplateRenderer,
  template: Option<&str>,
  agent: AgentTarget,
  bindings: &Value,
) -> Result<RenderedArtifact, RenderError> {
  let bindings = rules_bindings(agent, bindings);
  match template {
    Some(name) => renderer.render_named(name, &bindings),
    None => renderer.render_str(DEFAULT_RULES_TEMPLATE, &bindings),
  }
}

/// Where rules for `agent` go under `root`. A relative `output` resolves
/// against `root` and replaces the agent's default rules path.
pub fn rules_path(agent: AgentTarget, root: &Path, output: Option<&Path>) -> PathBuf {
  match output {
    Some(output) => root.join(output),
    None => root.join(agent.rules_path()),
  }
}

/// Write a rendered artifact to the agent's rules path under `root`, or to
/// `output` when given.
///
/// `root` must already exist; parent directories inside it are created.
pub async fn write_rules(
  agent: AgentTarget,
  root: &Path,
  output: Option<&Path>,
  artifact: &RenderedArtifact,
) -> Result<PathBuf, RenderError> {
  validate_target_dir(root).await?;
  let path = rules_path(agent, root, output);

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)
      .await
      .map_err(|e| RenderError::io(parent, e))?;
  }
  fs::write(&path, &artifact.text)
    .await
    .map_err(|e| RenderError::io(&path, e))?;

  info!(agent = %agent, path = %path.display(), "rules_written");
  Ok(path)
}

/// Render and write rules in one go. Nothing is written if rendering fails.
///
/// An `output` override also becomes the `output_file` template variable
/// unless `bindings` sets one.
pub async fn generate_rules(
  renderer: &TemplateRenderer,
  template: Option<&str>,
  agent: AgentTarget,
  root: &Path,
  output: Option<&Path>,
  bindings: &Value,
) -> Result<(PathBuf, RenderedArtifact), RenderError> {
  validate_target_dir(root).await?;

  let mut bindings = bindings.clone();
  if let (Some(output), Value::Object(map)) = (output, &mut bindings) {
    map
      .entry("output_file")
      .or_insert_with(|| Value::String(output.display().to_string()));
  }

  let artifact = render_rules(renderer, template, agent, &bindings)?;
  let path = write_rules(agent, root, output, &artifact).await?;
  Ok((path, artifact))
}
