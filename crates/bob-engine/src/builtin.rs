//! Built-in runner for deterministic operations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bob_config::{Operation, StepKind};
use bob_render::{RenderError, TemplateRenderer};
use bob_settings::{FsSettingsStore, MergePolicy, SettingsError, SettingsStore, merge_file, preset};
use bob_task::{RunnerError, StepContext, StepError, StepOutcome, TaskRunner};
use bob_workflow::Step;
use serde_json::{Value, json};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Runs deterministic operations in-process and hands agentic steps to `A`.
///
/// Relative paths in operations resolve against `root`. Merges into the same
/// file never overlap, even when their steps run in the same wave.
pub struct BuiltinRunner<A> {
  agent: A,
  root: PathBuf,
  store: Arc<dyn SettingsStore>,
  renderer: TemplateRenderer,
  locks: PathLocks,
}

/// One async lock per settings file.
#[derive(Default)]
struct PathLocks {
  locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
  /// Hold the lock for `path` until the guard is dropped.
  async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
    let key: PathBuf = path.components().collect();
    let lock = self.locks.lock().await.entry(key).or_default().clone();
    lock.lock_owned().await
  }
}

impl<A: TaskRunner> BuiltinRunner<A> {
  pub fn new(agent: A, root: impl Into<PathBuf>) -> Self {
    Self {
      agent,
      root: root.into(),
      store: Arc::new(FsSettingsStore::new()),
      renderer: TemplateRenderer::inline(),
      locks: PathLocks::default(),
    }
  }

  /// Resolve named templates from `dir`.
  pub fn with_templates(mut self, dir: impl Into<PathBuf>) -> Self {
    self.renderer = TemplateRenderer::new(dir);
    self
  }

  pub fn with_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
    self.store = store;
    self
  }

  fn resolve(&self, path: &Path) -> PathBuf {
    self.root.join(path)
  }

  async fn run_operation(&self, operation: &Operation, ctx: &StepContext) -> Result<Value, StepError> {
    match operation {
      Operation::MergeConfig {
        path,
        proposed,
        prefer_existing,
      } => {
        let path = self.resolve(path);
        let policy = MergePolicy {
          prefer_existing: *prefer_existing,
        };
        let _guard = self.locks.lock(&path).await;
        let report = merge_file(self.store.as_ref(), &path, proposed, policy)
          .await
          .map_err(settings_error)?;
        Ok(json!({
          "path": report.path.display().to_string(),
          "created": report.created,
          "changed": report.changed,
        }))
      }

      Operation::RenderTemplate {
        template,
        source,
        output,
        bindings,
      } => {
        let bindings = with_upstream(bindings, ctx);
        let artifact = match (template, source) {
          (Some(name), _) => self.renderer.render_named(name, &bindings),
          (None, Some(source)) => self.renderer.render_str(source, &bindings),
          (None, None) => {
            return Err(StepError::execution(
              "render_template needs a template name or an inline source",
            ));
          }
        }
        .map_err(render_error)?;

        let written = match output {
          Some(output) => {
            let path = self.resolve(output);
            write_file(&path, &artifact.text).await?;
            Some(path.display().to_string())
          }
          None => None,
        };

        Ok(json!({
          "text": artifact.text,
          "header": artifact.header,
          "path": written,
        }))
      }

      Operation::ApplyPreset {
        preset: name,
        agent,
        root,
        prefer_existing,
      } => {
        let found = preset::get(name).map_err(settings_error)?;
        let policy = MergePolicy {
          prefer_existing: *prefer_existing,
        };
        let root = self.resolve(root);
        let _guard = self.locks.lock(&root.join(agent.settings_path())).await;
        let report = preset::apply(self.store.as_ref(), &found, *agent, &root, policy)
          .await
          .map_err(settings_error)?;
        Ok(json!({
          "preset": found.name,
          "agent": agent.name(),
          "path": report.path.display().to_string(),
          "created": report.created,
          "changed": report.changed,
        }))
      }

      Operation::Echo { value } => Ok(value.clone()),
    }
  }
}

#[async_trait]
impl<A: TaskRunner> TaskRunner for BuiltinRunner<A> {
  async fn acquire(&self) -> Result<(), RunnerError> {
    self.agent.acquire().await
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> StepOutcome {
    match &step.kind {
      StepKind::Agentic { .. } => self.agent.execute(step, ctx).await,
      StepKind::Deterministic { operation } => {
        debug!(step_id = %step.id, op = operation.name(), "operation_started");
        match self.run_operation(operation, ctx).await {
          Ok(output) => StepOutcome::success(output),
          Err(e) => StepOutcome::failure(e),
        }
      }
    }
  }

  async fn release(&self) {
    self.agent.release().await
  }
}

/// Agent runner for setups without one. Agentic steps fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAgentRunner;

#[async_trait]
impl TaskRunner for NoAgentRunner {
  async fn execute(&self, step: &Step, _ctx: &StepContext) -> StepOutcome {
    StepOutcome::failure(StepError::execution(format!(
      "no agent runner configured for agentic step '{}'",
      step.id
    )))
  }
}

/// Template bindings plus the outputs of upstream steps under `upstream`,
/// unless the bindings already define that key.
fn with_upstream(bindings: &Value, ctx: &StepContext) -> Value {
  let mut map = match bindings {
    Value::Object(map) => map.clone(),
    _ => serde_json::Map::new(),
  };
  if !map.contains_key("upstream") {
    let upstream = ctx
      .upstream
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    map.insert("upstream".to_string(), Value::Object(upstream));
  }
  Value::Object(map)
}

async fn write_file(path: &Path, text: &str) -> Result<(), StepError> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| StepError::execution(format!("failed to create {}: {}", parent.display(), e)))?;
  }
  tokio::fs::write(path, text)
    .await
    .map_err(|e| StepError::execution(format!("failed to write {}: {}", path.display(), e)))
}

fn settings_error(err: SettingsError) -> StepError {
  match err {
    SettingsError::MalformedExisting { path, message } => StepError::MalformedExistingConfig {
      path: path.display().to_string(),
      message,
    },
    other => StepError::execution(other.to_string()),
  }
}

fn render_error(err: RenderError) -> StepError {
  match err {
    RenderError::HeaderValidation { message, line, .. } => StepError::HeaderValidation {
      message: match line {
        Some(line) => format!("line {}: {}", line, message),
        None => message,
      },
    },
    other => StepError::execution(other.to_string()),
  }
}
