//! Built-in verification checks.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bob_task::{StepOutcome, Verdict, Verifier};
use bob_workflow::Step;
use serde_json::Value;

/// Verifier for the checks bob knows about.
///
/// | check           | args                 | passes when                                |
/// |-----------------|----------------------|--------------------------------------------|
/// | `output_present`| none                 | the step produced a non-null output        |
/// | `output_equals` | `pointer`?, `value`  | the output at the JSON pointer equals value |
/// | `file_exists`   | `path`               | the file exists under the root             |
/// | `file_contains` | `path`, `text`       | the file exists and contains `text`        |
///
/// Unknown checks fail.
#[derive(Debug, Clone)]
pub struct BuiltinVerifier {
  root: PathBuf,
}

impl BuiltinVerifier {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn path_arg(&self, check: &str, args: &Value) -> Result<PathBuf, Verdict> {
    string_arg(check, args, "path").map(|p| self.root.join(p))
  }
}

#[async_trait]
impl Verifier for BuiltinVerifier {
  async fn check(&self, step: &Step, outcome: &StepOutcome) -> Verdict {
    let Some(verification) = &step.verification else {
      return Verdict::pass();
    };
    let check = verification.check.as_str();
    let args = &verification.args;

    match check {
      "output_present" => match &outcome.output {
        Some(output) if !output.is_null() => Verdict::pass(),
        _ => Verdict::fail("step produced no output"),
      },

      "output_equals" => {
        let pointer = args.get("pointer").and_then(Value::as_str).unwrap_or("");
        let Some(expected) = args.get("value") else {
          return Verdict::fail("check 'output_equals' needs a 'value' argument");
        };
        match outcome.output.as_ref().and_then(|o| o.pointer(pointer)) {
          Some(actual) if actual == expected => Verdict::pass(),
          Some(actual) => Verdict::fail(format!(
            "output at '{}' is {}, expected {}",
            pointer, actual, expected
          )),
          None => Verdict::fail(format!("output has nothing at '{}'", pointer)),
        }
      }

      "file_exists" => match self.path_arg(check, args) {
        Ok(path) => {
          if exists(&path).await {
            Verdict::pass()
          } else {
            Verdict::fail(format!("{} does not exist", path.display()))
          }
        }
        Err(verdict) => verdict,
      },

      "file_contains" => {
        let (path, text) = match (self.path_arg(check, args), string_arg(check, args, "text")) {
          (Ok(path), Ok(text)) => (path, text),
          (Err(verdict), _) | (_, Err(verdict)) => return verdict,
        };
        match tokio::fs::read_to_string(&path).await {
          Ok(content) if content.contains(text) => Verdict::pass(),
          Ok(_) => Verdict::fail(format!("{} does not contain '{}'", path.display(), text)),
          Err(e) => Verdict::fail(format!("failed to read {}: {}", path.display(), e)),
        }
      }

      other => Verdict::fail(format!("unknown verification check '{}'", other)),
    }
  }
}

fn string_arg<'a>(check: &str, args: &'a Value, name: &str) -> Result<&'a str, Verdict> {
  args.get(name).and_then(Value::as_str).ok_or_else(|| {
    Verdict::fail(format!(
      "check '{}' needs a string '{}' argument",
      check, name
    ))
  })
}

async fn exists(path: &Path) -> bool {
  tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use bob_config::{StepDef, WorkflowDef};
  use bob_workflow::Workflow;
  use serde_json::json;
  use tempfile::TempDir;

  fn step_with(check: &str, args: Value) -> Step {
    let def: StepDef = serde_json::from_value(json!({
      "id": "s",
      "kind": "deterministic",
      "operation": { "op": "echo" },
      "verification": { "check": check, "args": args }
    }))
    .unwrap();
    Workflow::build(WorkflowDef::from_steps("test", vec![def]))
      .unwrap()
      .steps()[0]
      .clone()
  }

  #[tokio::test]
  async fn test_output_checks() {
    let verifier = BuiltinVerifier::new(".");
    let outcome = StepOutcome::success(json!({ "mode": "plan", "tools": ["Read"] }));

    let present = verifier
      .check(&step_with("output_present", Value::Null), &outcome)
      .await;
    assert!(present.passed);

    let equals = verifier
      .check(
        &step_with("output_equals", json!({ "pointer": "/tools/0", "value": "Read" })),
        &outcome,
      )
      .await;
    assert!(equals.passed);

    let differs = verifier
      .check(
        &step_with("output_equals", json!({ "pointer": "/mode", "value": "code" })),
        &outcome,
      )
      .await;
    assert!(!differs.passed);
    assert_eq!(
      differs.detail.as_deref(),
      Some("output at '/mode' is \"plan\", expected \"code\"")
    );
  }

  #[tokio::test]
  async fn test_missing_output_fails() {
    let verdict = BuiltinVerifier::new(".")
      .check(&step_with("output_present", Value::Null), &StepOutcome::empty())
      .await;
    assert!(!verdict.passed);
  }

  #[tokio::test]
  async fn test_file_checks() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("CLAUDE.md"), "# Rules\nrun cargo test\n").unwrap();
    let verifier = BuiltinVerifier::new(dir.path());
    let outcome = StepOutcome::empty();

    assert!(
      verifier
        .check(&step_with("file_exists", json!({ "path": "CLAUDE.md" })), &outcome)
        .await
        .passed
    );
    assert!(
      !verifier
        .check(&step_with("file_exists", json!({ "path": "missing.md" })), &outcome)
        .await
        .passed
    );
    assert!(
      verifier
        .check(
          &step_with("file_contains", json!({ "path": "CLAUDE.md", "text": "cargo test" })),
          &outcome
        )
        .await
        .passed
    );
    assert!(
      !verifier
        .check(
          &step_with("file_contains", json!({ "path": "CLAUDE.md", "text": "npm" })),
          &outcome
        )
        .await
        .passed
    );
  }

  #[tokio::test]
  async fn test_bad_arguments_and_unknown_checks_fail() {
    let verifier = BuiltinVerifier::new(".");
    let outcome = StepOutcome::empty();

    let missing_path = verifier
      .check(&step_with("file_exists", json!({})), &outcome)
      .await;
    assert_eq!(
      missing_path.detail.as_deref(),
      Some("check 'file_exists' needs a string 'path' argument")
    );

    let unknown = verifier
      .check(&step_with("looks_good", Value::Null), &outcome)
      .await;
    assert_eq!(
      unknown.detail.as_deref(),
      Some("unknown verification check 'looks_good'")
    );
  }
}
