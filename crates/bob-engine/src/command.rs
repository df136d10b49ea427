//! Agent runner that delegates agentic steps to an external command.
//!
//! Each attempt spawns the command once. The request is written to its stdin
//! as JSON:
//! ```json
//! {
//!   "stepId": "analyze",
//!   "executionId": "…",
//!   "attempt": 1,
//!   "prompt": "Summarize the repository layout",
//!   "tools": ["Read", "Grep"],
//!   "context": {},
//!   "upstream": { "scan": { "files": 12 } }
//! }
//! ```
//! and the reply is read from stdout:
//! ```json
//! { "ok": true, "output": { "summary": "…" } }
//! ```
//! `error` may be a plain message or a structured step error. Empty stdout
//! from a successful exit is a success without output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bob_config::StepKind;
use bob_task::{StepContext, StepError, StepOutcome, TaskRunner};
use bob_workflow::Step;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentRequest<'a> {
  step_id: &'a str,
  execution_id: &'a str,
  attempt: u32,
  prompt: &'a str,
  tools: &'a [String],
  context: &'a Value,
  upstream: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AgentReply {
  ok: bool,
  #[serde(default)]
  output: Option<Value>,
  #[serde(default)]
  error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyError {
  Message(String),
  Structured(StepError),
}

impl From<AgentReply> for StepOutcome {
  fn from(reply: AgentReply) -> Self {
    let error = reply.error.map(|e| match e {
      ReplyError::Message(message) => StepError::Execution { message },
      ReplyError::Structured(error) => error,
    });
    StepOutcome {
      ok: reply.ok,
      output: reply.output,
      error,
    }
  }
}

/// Runs agentic steps by spawning `program` with `args`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
  program: String,
  args: Vec<String>,
  working_dir: Option<PathBuf>,
}

impl CommandRunner {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      working_dir: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = Some(dir.into());
    self
  }

  async fn invoke(&self, request: &AgentRequest<'_>) -> Result<StepOutcome, StepError> {
    let payload = serde_json::to_vec(request)
      .map_err(|e| StepError::execution(format!("failed to encode agent request: {}", e)))?;

    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &self.working_dir {
      command.current_dir(dir);
    }

    let mut child = command
      .spawn()
      .map_err(|e| StepError::execution(format!("failed to spawn '{}': {}", self.program, e)))?;

    // The request is fed while stdout is drained; a command may reply
    // before it has read all of its input.
    let stdin = child.stdin.take();
    let feed = async move {
      if let Some(mut stdin) = stdin {
        // A command that exits without reading its input is not an error here
        let _ = stdin.write_all(&payload).await;
      }
    };

    let ((), output) = tokio::join!(feed, child.wait_with_output());
    let output = output
      .map_err(|e| StepError::execution(format!("failed to wait for '{}': {}", self.program, e)))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(StepError::execution(format!(
        "agent command exited with {}: {}",
        output.status,
        stderr.trim()
      )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
      return Ok(StepOutcome::empty());
    }

    serde_json::from_str::<AgentReply>(stdout.trim())
      .map(StepOutcome::from)
      .map_err(|e| StepError::execution(format!("invalid agent reply: {}", e)))
  }
}

#[async_trait]
impl TaskRunner for CommandRunner {
  async fn execute(&self, step: &Step, ctx: &StepContext) -> StepOutcome {
    let StepKind::Agentic {
      prompt,
      tools,
      context,
    } = &step.kind
    else {
      return StepOutcome::failure(StepError::execution(format!(
        "command runner only runs agentic steps, '{}' is {}",
        step.id,
        step.kind.name()
      )));
    };

    let request = AgentRequest {
      step_id: &step.id,
      execution_id: &ctx.execution_id,
      attempt: ctx.attempt,
      prompt,
      tools,
      context,
      upstream: &ctx.upstream,
    };

    debug!(step_id = %step.id, program = %self.program, attempt = ctx.attempt, "agent_invoked");

    match self.invoke(&request).await {
      Ok(outcome) => outcome,
      Err(e) => StepOutcome::failure(e),
    }
  }
}
