//! Integration tests for WorkflowExecutor using mock runners and verifiers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bob_config::WorkflowDef;
use bob_engine::{
  BuiltinRunner, BuiltinVerifier, ChannelNotifier, ExecutionError, ExecutionEvent, ExecutorConfig,
  NoAgentRunner, WorkflowExecutor,
};
use bob_task::{
  RunnerError, SkipReason, StepContext, StepError, StepOutcome, StepStatus, TaskRunner, Verdict,
  VerificationStatus, Verifier,
};
use bob_workflow::{Step, Workflow};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runner that succeeds with the step id as output unless told otherwise.
#[derive(Default)]
struct MockRunner {
  /// step id -> number of leading attempts that fail
  failures: HashMap<String, u32>,
  delays: HashMap<String, Duration>,
  refuse_acquire: bool,
  calls: Mutex<Vec<String>>,
  contexts: Mutex<HashMap<String, StepContext>>,
  running: AtomicUsize,
  peak: AtomicUsize,
  acquired: AtomicUsize,
  released: AtomicUsize,
}

impl MockRunner {
  fn failing(mut self, step_id: &str) -> Self {
    self.failures.insert(step_id.to_string(), u32::MAX);
    self
  }

  fn failing_times(mut self, step_id: &str, times: u32) -> Self {
    self.failures.insert(step_id.to_string(), times);
    self
  }

  fn slow(mut self, step_id: &str, delay: Duration) -> Self {
    self.delays.insert(step_id.to_string(), delay);
    self
  }

  fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  fn context(&self, step_id: &str) -> StepContext {
    self.contexts.lock().unwrap()[step_id].clone()
  }
}

#[async_trait]
impl TaskRunner for MockRunner {
  async fn acquire(&self) -> Result<(), RunnerError> {
    self.acquired.fetch_add(1, Ordering::SeqCst);
    if self.refuse_acquire {
      return Err(RunnerError::Unavailable("agent offline".to_string()));
    }
    Ok(())
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> StepOutcome {
    self.calls.lock().unwrap().push(step.id.clone());
    self
      .contexts
      .lock()
      .unwrap()
      .insert(step.id.clone(), ctx.clone());

    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = self.delays.get(&step.id) {
      tokio::time::sleep(*delay).await;
    }
    self.running.fetch_sub(1, Ordering::SeqCst);

    let failing = self.failures.get(&step.id).copied().unwrap_or(0);
    if ctx.attempt <= failing {
      return StepOutcome::failure(StepError::execution(format!("{} broke", step.id)));
    }
    StepOutcome::success(json!(step.id))
  }

  async fn release(&self) {
    self.released.fetch_add(1, Ordering::SeqCst);
  }
}

/// Verifier that rejects the listed steps.
#[derive(Default)]
struct MockVerifier {
  reject: HashSet<String>,
}

impl MockVerifier {
  fn rejecting(step_id: &str) -> Self {
    Self {
      reject: HashSet::from([step_id.to_string()]),
    }
  }
}

#[async_trait]
impl Verifier for MockVerifier {
  async fn check(&self, step: &Step, _outcome: &StepOutcome) -> Verdict {
    if self.reject.contains(&step.id) {
      Verdict::fail("objective not met")
    } else {
      Verdict::pass()
    }
  }
}

fn step(id: &str, deps: &[&str]) -> Value {
  json!({
    "id": id,
    "kind": "deterministic",
    "operation": { "op": "echo", "value": id },
    "dependsOn": deps,
  })
}

fn critical(mut step: Value) -> Value {
  step["critical"] = json!(true);
  step
}

fn verified(mut step: Value) -> Value {
  step["verification"] = json!({ "check": "goal" });
  step
}

fn workflow(steps: Vec<Value>) -> Workflow {
  let def: WorkflowDef = serde_json::from_value(json!({ "name": "test", "steps": steps })).unwrap();
  Workflow::build(def).unwrap()
}

fn executor(runner: &Arc<MockRunner>, verifier: MockVerifier) -> WorkflowExecutor {
  WorkflowExecutor::new(runner.clone(), Arc::new(verifier), ExecutorConfig::default())
}

#[tokio::test]
async fn test_critical_failure_skips_dependents_but_not_wave_siblings() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![critical(step("A", &[])), step("B", &["A"]), step("C", &[])]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let a = result.get("A").unwrap();
  assert_eq!(a.status(), StepStatus::Failed);
  assert!(a.error().unwrap().is_execution_failure());

  let b = result.get("B").unwrap();
  assert_eq!(b.status(), StepStatus::Skipped);
  assert_eq!(b.skip_reason().unwrap().to_string(), "dependency A failed");

  assert_eq!(result.get("C").unwrap().status(), StepStatus::Success);
  assert!(!result.success);
  assert!(!runner.calls().contains(&"B".to_string()));
}

#[tokio::test]
async fn test_skips_propagate_transitively() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![
    critical(step("A", &[])),
    step("B", &["A"]),
    step("D", &["B"]),
  ]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(
    result.get("B").unwrap().skip_reason(),
    Some(&SkipReason::DependencyFailed("A".to_string()))
  );
  assert_eq!(
    result.get("D").unwrap().skip_reason(),
    Some(&SkipReason::DependencySkipped("B".to_string()))
  );
  assert_eq!(runner.calls(), vec!["A"]);
}

#[tokio::test]
async fn test_critical_failure_stops_later_waves() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![
    critical(step("A", &[])),
    step("C", &[]),
    step("E", &["C"]),
  ]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("C").unwrap().status(), StepStatus::Success);
  assert_eq!(
    result.get("E").unwrap().skip_reason().unwrap().to_string(),
    "critical step A failed"
  );
  assert!(!runner.calls().contains(&"E".to_string()));
}

#[tokio::test]
async fn test_critical_failure_stops_queued_wave_members() {
  let runner = Arc::new(
    MockRunner::default()
      .failing("A")
      .slow("A", Duration::from_millis(20)),
  );
  let wf = workflow(vec![
    critical(step("A", &[])),
    step("C", &[]),
    step("D", &[]),
    step("E", &[]),
  ]);
  let config = ExecutorConfig {
    max_concurrency: 1,
    ..ExecutorConfig::default()
  };

  let result = WorkflowExecutor::new(runner.clone(), Arc::new(MockVerifier::default()), config)
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(runner.calls(), vec!["A"]);
  for id in ["C", "D", "E"] {
    assert_eq!(
      result.get(id).unwrap().skip_reason(),
      Some(&SkipReason::CriticalStepFailed("A".to_string()))
    );
  }
  assert!(!result.success);
}

#[tokio::test]
async fn test_cancellation_stops_queued_wave_members() {
  let runner = Arc::new(MockRunner::default().slow("A", Duration::from_millis(200)));
  let wf = workflow(vec![step("A", &[]), step("B", &[]), step("C", &[])]);
  let config = ExecutorConfig {
    max_concurrency: 1,
    ..ExecutorConfig::default()
  };
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let result = WorkflowExecutor::new(runner.clone(), Arc::new(MockVerifier::default()), config)
    .execute(&wf, cancel)
    .await
    .unwrap();

  assert!(result.cancelled);
  assert_eq!(runner.calls(), vec!["A"]);
  assert_eq!(result.get("A").unwrap().status(), StepStatus::Success);
  for id in ["B", "C"] {
    assert_eq!(
      result.get(id).unwrap().skip_reason(),
      Some(&SkipReason::Cancelled)
    );
  }
}

#[tokio::test]
async fn test_non_critical_failure_is_isolated() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![
    step("A", &[]),
    step("B", &["A"]),
    critical(step("C", &[])),
    step("D", &["C"]),
  ]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("A").unwrap().status(), StepStatus::Failed);
  assert_eq!(result.get("B").unwrap().status(), StepStatus::Skipped);
  assert_eq!(result.get("C").unwrap().status(), StepStatus::Success);
  assert_eq!(result.get("D").unwrap().status(), StepStatus::Success);
  assert!(result.success);
}

#[tokio::test]
async fn test_results_follow_execution_order_and_are_terminal() {
  let runner = Arc::new(MockRunner::default().failing("b"));
  let wf = workflow(vec![
    step("d", &["b", "c"]),
    step("b", &["a"]),
    step("c", &["a"]),
    step("a", &[]),
  ]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let ids: Vec<&str> = result.steps.iter().map(|s| s.step_id()).collect();
  assert_eq!(ids, wf.execution_order());
  assert!(result.steps.iter().all(|s| s.status().is_terminal()));
}

#[tokio::test]
async fn test_timeout_marks_step_failed() {
  let runner = Arc::new(MockRunner::default().slow("slow", Duration::from_secs(5)));
  let mut slow = critical(step("slow", &[]));
  slow["timeoutMs"] = json!(20);
  let wf = workflow(vec![slow, step("after", &["slow"])]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let slow = result.get("slow").unwrap();
  assert_eq!(slow.status(), StepStatus::Failed);
  assert_eq!(slow.error(), Some(&StepError::Timeout { timeout_ms: 20 }));
  assert_eq!(
    result.get("after").unwrap().skip_reason().unwrap().to_string(),
    "dependency slow failed"
  );
}

#[tokio::test]
async fn test_executor_default_timeout_applies() {
  let runner = Arc::new(MockRunner::default().slow("slow", Duration::from_secs(5)));
  let wf = workflow(vec![step("slow", &[])]);
  let config = ExecutorConfig {
    default_timeout: Duration::from_millis(20),
    ..ExecutorConfig::default()
  };

  let result = WorkflowExecutor::new(runner.clone(), Arc::new(MockVerifier::default()), config)
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.get("slow").unwrap().error().unwrap().is_timeout());
}

#[tokio::test]
async fn test_verification_failure_fails_step_and_skips_dependents() {
  let runner = Arc::new(MockRunner::default());
  let wf = workflow(vec![verified(step("write", &[])), step("use", &["write"])]);

  let result = executor(&runner, MockVerifier::rejecting("write"))
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let write = result.get("write").unwrap();
  assert_eq!(write.status(), StepStatus::Failed);
  assert_eq!(
    write.error(),
    Some(&StepError::VerificationFailed {
      detail: "objective not met".to_string()
    })
  );
  assert_eq!(write.verification(), VerificationStatus::Failed);
  assert_eq!(write.verification_detail(), Some("objective not met"));
  assert_eq!(write.output(), Some(&json!("write")));
  assert_eq!(result.get("use").unwrap().status(), StepStatus::Skipped);
}

#[tokio::test]
async fn test_passing_verification_is_recorded() {
  let runner = Arc::new(MockRunner::default());
  let wf = workflow(vec![critical(verified(step("write", &[])))]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let write = result.get("write").unwrap();
  assert_eq!(write.status(), StepStatus::Success);
  assert_eq!(write.verification(), VerificationStatus::Passed);
  assert!(result.success);
}

#[tokio::test]
async fn test_retries_recover_from_execution_failures() {
  let runner = Arc::new(MockRunner::default().failing_times("flaky", 2));
  let mut flaky = step("flaky", &[]);
  flaky["maxRetryAttempts"] = json!(2);
  let wf = workflow(vec![flaky]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let flaky = result.get("flaky").unwrap();
  assert_eq!(flaky.status(), StepStatus::Success);
  assert_eq!(flaky.attempts(), 3);
  assert_eq!(runner.context("flaky").attempt, 3);
}

#[tokio::test]
async fn test_retries_stop_at_the_limit() {
  let runner = Arc::new(MockRunner::default().failing_times("flaky", 5));
  let mut flaky = step("flaky", &[]);
  flaky["maxRetryAttempts"] = json!(1);
  let wf = workflow(vec![flaky]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let flaky = result.get("flaky").unwrap();
  assert_eq!(flaky.status(), StepStatus::Failed);
  assert_eq!(flaky.attempts(), 2);
  assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_verification_failures_are_not_retried() {
  let runner = Arc::new(MockRunner::default());
  let mut checked = verified(step("checked", &[]));
  checked["maxRetryAttempts"] = json!(3);
  let wf = workflow(vec![checked]);

  let result = executor(&runner, MockVerifier::rejecting("checked"))
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.get("checked").unwrap().attempts(), 1);
  assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_session_released_on_abort() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![critical(step("A", &[])), step("B", &["A"])]);

  executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(runner.acquired.load(Ordering::SeqCst), 1);
  assert_eq!(runner.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_acquire_failure_runs_nothing() {
  let runner = Arc::new(MockRunner {
    refuse_acquire: true,
    ..MockRunner::default()
  });
  let wf = workflow(vec![step("A", &[])]);

  let err = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, ExecutionError::Acquire(_)));
  assert!(runner.calls().is_empty());
  assert_eq!(runner.released.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_skips_everything() {
  let runner = Arc::new(MockRunner::default());
  let wf = workflow(vec![step("A", &[]), step("B", &["A"])]);
  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, cancel)
    .await
    .unwrap();

  assert!(result.cancelled);
  assert!(
    result
      .steps
      .iter()
      .all(|s| s.skip_reason() == Some(&SkipReason::Cancelled))
  );
  assert!(runner.calls().is_empty());
  assert_eq!(runner.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_lets_running_steps_finish() {
  let runner = Arc::new(MockRunner::default().slow("A", Duration::from_millis(200)));
  let wf = workflow(vec![step("A", &[]), step("B", &["A"]), step("C", &["B"])]);
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, cancel)
    .await
    .unwrap();

  assert!(result.cancelled);
  assert_eq!(result.get("A").unwrap().status(), StepStatus::Success);
  for id in ["B", "C"] {
    assert_eq!(
      result.get(id).unwrap().skip_reason(),
      Some(&SkipReason::Cancelled)
    );
  }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
  let delay = Duration::from_millis(50);
  let runner = Arc::new(
    MockRunner::default()
      .slow("a", delay)
      .slow("b", delay)
      .slow("c", delay)
      .slow("d", delay),
  );
  let def: WorkflowDef = serde_json::from_value(json!({
    "name": "wide",
    "maxConcurrency": 2,
    "steps": [step("a", &[]), step("b", &[]), step("c", &[]), step("d", &[])]
  }))
  .unwrap();
  let wf = Workflow::build(def).unwrap();

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.success);
  assert_eq!(result.count(StepStatus::Success), 4);
  assert!(runner.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_single_permit_runs_in_execution_order() {
  let runner = Arc::new(
    MockRunner::default()
      .slow("first", Duration::from_millis(30))
      .slow("second", Duration::from_millis(5)),
  );
  let wf = workflow(vec![
    step("first", &[]),
    step("second", &[]),
    step("third", &["first"]),
  ]);
  let config = ExecutorConfig {
    max_concurrency: 1,
    ..ExecutorConfig::default()
  };

  WorkflowExecutor::new(runner.clone(), Arc::new(MockVerifier::default()), config)
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(runner.calls(), wf.execution_order());
  assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_outputs_reach_dependents() {
  let runner = Arc::new(MockRunner::default());
  let wf = workflow(vec![
    step("scan", &[]),
    step("lint", &[]),
    step("report", &["scan", "lint"]),
  ]);

  let result = executor(&runner, MockVerifier::default())
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let ctx = runner.context("report");
  assert_eq!(ctx.execution_id, result.execution_id);
  assert_eq!(ctx.upstream["scan"], json!("scan"));
  assert_eq!(ctx.upstream["lint"], json!("lint"));
  assert!(runner.context("scan").upstream.is_empty());
}

#[tokio::test]
async fn test_events_are_emitted() {
  let runner = Arc::new(MockRunner::default().failing("A"));
  let wf = workflow(vec![critical(step("A", &[])), step("B", &["A"])]);
  let (tx, mut rx) = mpsc::unbounded_channel();

  let result = executor(&runner, MockVerifier::default())
    .with_notifier(Arc::new(ChannelNotifier::new(tx)))
    .execute(&wf, CancellationToken::new())
    .await
    .unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }

  assert_eq!(
    events.first(),
    Some(&ExecutionEvent::WorkflowStarted {
      execution_id: result.execution_id.clone(),
      workflow: "test".to_string(),
    })
  );
  assert!(events.contains(&ExecutionEvent::StepSkipped {
    execution_id: result.execution_id.clone(),
    step_id: "B".to_string(),
    reason: "dependency A failed".to_string(),
  }));
  assert_eq!(
    events.last(),
    Some(&ExecutionEvent::WorkflowCompleted {
      execution_id: result.execution_id.clone(),
      success: false,
      cancelled: false,
    })
  );
}

#[tokio::test]
async fn test_empty_workflow_succeeds() {
  let runner = Arc::new(MockRunner::default());
  let result = executor(&runner, MockVerifier::default())
    .execute(&workflow(vec![]), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.success);
  assert!(result.steps.is_empty());
  assert_eq!(runner.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_builtin_runner_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
  std::fs::write(
    dir.path().join(".claude/settings.json"),
    r#"{"defaultMode": "plan", "tools": ["Read"]}"#,
  )
  .unwrap();

  let def: WorkflowDef = serde_json::from_value(json!({
    "name": "onboard",
    "steps": [
      {
        "id": "settings",
        "kind": "deterministic",
        "critical": true,
        "operation": {
          "op": "merge_config",
          "path": ".claude/settings.json",
          "proposed": { "defaultMode": "code", "tools": ["Read", "Write"] }
        },
        "verification": {
          "check": "file_contains",
          "args": { "path": ".claude/settings.json", "text": "Write" }
        }
      },
      {
        "id": "rules",
        "kind": "deterministic",
        "dependsOn": ["settings"],
        "operation": {
          "op": "render_template",
          "source": "# Rules\nsettings changed: {{ upstream.settings.changed }}\n",
          "output": "CLAUDE.md"
        },
        "verification": { "check": "file_exists", "args": { "path": "CLAUDE.md" } }
      }
    ]
  }))
  .unwrap();
  let wf = Workflow::build(def).unwrap();

  let executor = WorkflowExecutor::new(
    Arc::new(BuiltinRunner::new(NoAgentRunner, dir.path())),
    Arc::new(BuiltinVerifier::new(dir.path())),
    ExecutorConfig::default(),
  );
  let result = executor.execute(&wf, CancellationToken::new()).await.unwrap();

  assert!(result.success, "{}", result.report());
  let settings: Value = serde_json::from_str(
    &std::fs::read_to_string(dir.path().join(".claude/settings.json")).unwrap(),
  )
  .unwrap();
  assert_eq!(
    settings,
    json!({ "defaultMode": "plan", "tools": ["Read", "Write"] })
  );
  assert_eq!(
    std::fs::read_to_string(dir.path().join("CLAUDE.md")).unwrap(),
    "# Rules\nsettings changed: true"
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_merges_in_one_wave_into_one_file_all_land() {
  for _ in 0..10 {
    let dir = tempfile::tempdir().unwrap();
    let steps = (0..4)
      .map(|i| {
        let mut proposed = serde_json::Map::new();
        proposed.insert(format!("k{}", i), json!(i));
        json!({
          "id": format!("merge-{}", i),
          "kind": "deterministic",
          "operation": {
            "op": "merge_config",
            "path": ".claude/settings.json",
            "proposed": proposed
          }
        })
      })
      .collect();
    let wf = workflow(steps);

    let executor = WorkflowExecutor::new(
      Arc::new(BuiltinRunner::new(NoAgentRunner, dir.path())),
      Arc::new(BuiltinVerifier::new(dir.path())),
      ExecutorConfig::default(),
    );
    let result = executor.execute(&wf, CancellationToken::new()).await.unwrap();
    assert_eq!(result.count(StepStatus::Success), 4);

    let settings: Value = serde_json::from_str(
      &std::fs::read_to_string(dir.path().join(".claude/settings.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(settings, json!({ "k0": 0, "k1": 1, "k2": 2, "k3": 3 }));
  }
}
