//! Workflow executor implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bob_task::{
  SkipReason, StepContext, StepError, StepOutcome, StepResult, StepStatus, TaskRunner, Verdict,
  Verifier, WorkflowRunResult,
};
use bob_workflow::{Step, Workflow};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecutionError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Configuration for the workflow executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Timeout for steps when neither the step nor the workflow sets one.
  pub default_timeout: Duration,
  /// Steps running at once within a wave, unless the workflow says otherwise.
  pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      default_timeout: DEFAULT_STEP_TIMEOUT,
      max_concurrency: DEFAULT_MAX_CONCURRENCY,
    }
  }
}

/// The workflow executor.
///
/// Runs a validated [`Workflow`] in waves: every pending step whose
/// dependencies all succeeded is dispatched together, bounded by the
/// concurrency limit. Once a critical step fails, wave members still waiting
/// for a permit are not started. Workers hand their results back to the loop in
/// [`WorkflowExecutor::execute`], which is the only writer of step state.
pub struct WorkflowExecutor {
  runner: Arc<dyn TaskRunner>,
  verifier: Arc<dyn Verifier>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: ExecutorConfig,
}

/// What a worker produced for one dispatched step.
struct StepRun {
  attempts: u32,
  output: Option<Value>,
  verdict: Option<Verdict>,
  error: Option<StepError>,
}

impl StepRun {
  fn failed(attempts: u32, error: StepError) -> Self {
    Self {
      attempts,
      output: None,
      verdict: None,
      error: Some(error),
    }
  }

  fn lost(err: JoinError) -> Self {
    let message = if err.is_panic() {
      "step task panicked"
    } else {
      "step task was cancelled"
    };
    Self::failed(1, StepError::execution(message))
  }
}

impl WorkflowExecutor {
  pub fn new(
    runner: Arc<dyn TaskRunner>,
    verifier: Arc<dyn Verifier>,
    config: ExecutorConfig,
  ) -> Self {
    Self {
      runner,
      verifier,
      notifier: Arc::new(NoopNotifier),
      config,
    }
  }

  /// Report execution events to `notifier`.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Execute a workflow.
  ///
  /// Step failures never surface as errors; they are recorded in the
  /// returned [`WorkflowRunResult`]. The runner session is released on every
  /// path once it has been acquired.
  #[instrument(
    name = "workflow_execute",
    skip(self, workflow, cancel),
    fields(workflow = %workflow.name, steps = workflow.len())
  )]
  pub async fn execute(
    &self,
    workflow: &Workflow,
    cancel: CancellationToken,
  ) -> Result<WorkflowRunResult, ExecutionError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      workflow = %workflow.name,
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow: workflow.name.clone(),
    });

    if let Err(e) = self.runner.acquire().await {
      error!(execution_id = %execution_id, error = %e, "workflow_failed");
      self.notifier.notify(ExecutionEvent::WorkflowFailed {
        execution_id,
        error: e.to_string(),
      });
      return Err(ExecutionError::Acquire(e));
    }

    let outcome = self.run_steps(workflow, &execution_id, &cancel).await;
    self.runner.release().await;

    let (steps, cancelled) = match outcome {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "workflow_failed");
        self.notifier.notify(ExecutionEvent::WorkflowFailed {
          execution_id,
          error: e.to_string(),
        });
        return Err(e);
      }
    };

    let result = WorkflowRunResult::new(
      execution_id.clone(),
      workflow.name.clone(),
      steps,
      cancelled,
    );

    info!(
      execution_id = %execution_id,
      success = result.success,
      cancelled = result.cancelled,
      succeeded = result.count(StepStatus::Success),
      failed = result.count(StepStatus::Failed),
      skipped = result.count(StepStatus::Skipped),
      "workflow_completed"
    );
    self.notifier.notify(ExecutionEvent::WorkflowCompleted {
      execution_id,
      success: result.success,
      cancelled: result.cancelled,
    });

    Ok(result)
  }

  /// Run the wave loop. Returns results in execution order and whether the
  /// run was cancelled.
  async fn run_steps(
    &self,
    workflow: &Workflow,
    execution_id: &str,
    cancel: &CancellationToken,
  ) -> Result<(Vec<StepResult>, bool), ExecutionError> {
    let mut results: HashMap<String, StepResult> = workflow
      .steps()
      .iter()
      .map(|s| (s.id.clone(), StepResult::pending(&s.id, s.critical)))
      .collect();

    let semaphore = Arc::new(Semaphore::new(self.concurrency(workflow)));
    // Trips on external cancellation or on the first critical failure
    let halt = cancel.child_token();
    let mut aborted_by: Option<String> = None;
    let mut cancelled = false;

    loop {
      self.skip_blocked(workflow, &mut results, execution_id)?;

      if cancel.is_cancelled() {
        warn!(execution_id = %execution_id, "workflow_cancelled");
        cancelled = true;
        break;
      }

      let wave: Vec<&Step> = workflow
        .ordered_steps()
        .filter(|s| is_ready(s, &results))
        .collect();
      if wave.is_empty() {
        break;
      }

      debug!(
        execution_id = %execution_id,
        wave = ?wave.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        "wave_dispatched"
      );

      let mut dispatched: Vec<&Step> = Vec::with_capacity(wave.len());
      let mut handles = Vec::with_capacity(wave.len());
      for step in &wave {
        // Permits are taken in execution order, so a limit of 1 is sequential
        let permit = semaphore
          .clone()
          .acquire_owned()
          .await
          .map_err(|e| ExecutionError::Dispatch {
            message: e.to_string(),
          })?;

        // A critical failure or a cancellation while waiting for the permit
        // leaves the rest of the wave pending.
        if halt.is_cancelled() {
          debug!(
            execution_id = %execution_id,
            step_id = %step.id,
            "dispatch_halted"
          );
          break;
        }

        slot(&mut results, &step.id)?.start()?;

        info!(
          execution_id = %execution_id,
          step_id = %step.id,
          kind = step.kind.name(),
          critical = step.critical,
          "step_started"
        );
        self.notifier.notify(ExecutionEvent::StepStarted {
          execution_id: execution_id.to_string(),
          step_id: step.id.clone(),
        });

        let ctx = StepContext {
          execution_id: execution_id.to_string(),
          attempt: 0,
          upstream: upstream_outputs(step, &results),
        };

        let runner = self.runner.clone();
        let verifier = self.verifier.clone();
        let halt = halt.clone();
        let owned = (*step).clone();
        let timeout = self.timeout(&owned, workflow);

        handles.push(tokio::spawn(async move {
          let _permit = permit;
          let run = run_step(runner.as_ref(), verifier.as_ref(), &owned, ctx, timeout).await;
          // Signalled before the permit is returned
          if owned.critical && run.error.is_some() {
            halt.cancel();
          }
          run
        }));
        dispatched.push(*step);
      }

      let runs = join_all(handles).await;

      for (step, joined) in dispatched.iter().zip(runs) {
        let run = joined.unwrap_or_else(StepRun::lost);
        let failed = self.record(step, run, slot(&mut results, &step.id)?, execution_id)?;
        if failed && step.critical && aborted_by.is_none() {
          aborted_by = Some(step.id.clone());
        }
      }

      if let Some(step_id) = &aborted_by {
        warn!(
          execution_id = %execution_id,
          step_id = %step_id,
          "critical_step_failed"
        );
        break;
      }
    }

    self.skip_remaining(
      workflow,
      &mut results,
      execution_id,
      aborted_by.as_deref(),
      cancelled,
    )?;

    let steps = workflow
      .execution_order()
      .iter()
      .filter_map(|id| results.remove(id))
      .collect();

    Ok((steps, cancelled))
  }

  /// Move a finished worker's result into the step's record. Returns whether
  /// the step failed.
  fn record(
    &self,
    step: &Step,
    run: StepRun,
    result: &mut StepResult,
    execution_id: &str,
  ) -> Result<bool, ExecutionError> {
    result.record_attempts(run.attempts)?;
    result.record_output(run.output)?;
    if let Some(verdict) = &run.verdict {
      result.record_verdict(verdict)?;
    }

    match run.error {
      None => {
        result.succeed()?;
        info!(
          execution_id = %execution_id,
          step_id = %step.id,
          attempts = run.attempts,
          "step_completed"
        );
        self.notifier.notify(ExecutionEvent::StepCompleted {
          execution_id: execution_id.to_string(),
          step_id: step.id.clone(),
          output: result.output().cloned(),
        });
        Ok(false)
      }
      Some(err) => {
        error!(
          execution_id = %execution_id,
          step_id = %step.id,
          attempts = run.attempts,
          error = %err,
          "step_failed"
        );
        self.notifier.notify(ExecutionEvent::StepFailed {
          execution_id: execution_id.to_string(),
          step_id: step.id.clone(),
          error: err.to_string(),
        });
        result.fail(err)?;
        Ok(true)
      }
    }
  }

  /// Skip every pending step with a failed or skipped dependency.
  ///
  /// Walking in execution order settles whole chains in one pass.
  fn skip_blocked(
    &self,
    workflow: &Workflow,
    results: &mut HashMap<String, StepResult>,
    execution_id: &str,
  ) -> Result<(), ExecutionError> {
    for step in workflow.ordered_steps() {
      if !is_pending(&step.id, results) {
        continue;
      }
      if let Some(reason) = blocked_reason(step, results) {
        self.skip(step, reason, results, execution_id)?;
      }
    }
    Ok(())
  }

  /// Skip whatever is still pending once the loop has stopped.
  fn skip_remaining(
    &self,
    workflow: &Workflow,
    results: &mut HashMap<String, StepResult>,
    execution_id: &str,
    aborted_by: Option<&str>,
    cancelled: bool,
  ) -> Result<(), ExecutionError> {
    for step in workflow.ordered_steps() {
      if !is_pending(&step.id, results) {
        continue;
      }

      let reason = if cancelled {
        SkipReason::Cancelled
      } else if let Some(reason) = blocked_reason(step, results) {
        reason
      } else if let Some(critical) = aborted_by {
        SkipReason::CriticalStepFailed(critical.to_string())
      } else {
        continue;
      };

      self.skip(step, reason, results, execution_id)?;
    }
    Ok(())
  }

  fn skip(
    &self,
    step: &Step,
    reason: SkipReason,
    results: &mut HashMap<String, StepResult>,
    execution_id: &str,
  ) -> Result<(), ExecutionError> {
    info!(
      execution_id = %execution_id,
      step_id = %step.id,
      reason = %reason,
      "step_skipped"
    );
    self.notifier.notify(ExecutionEvent::StepSkipped {
      execution_id: execution_id.to_string(),
      step_id: step.id.clone(),
      reason: reason.to_string(),
    });
    slot(results, &step.id)?.skip(reason)?;
    Ok(())
  }

  fn concurrency(&self, workflow: &Workflow) -> usize {
    workflow
      .max_concurrency
      .unwrap_or(self.config.max_concurrency)
      .max(1)
  }

  fn timeout(&self, step: &Step, workflow: &Workflow) -> Duration {
    step
      .timeout_ms
      .or(workflow.timeout_ms)
      .map(Duration::from_millis)
      .unwrap_or(self.config.default_timeout)
  }
}

/// Run one step to completion: execute with retries, then verify.
async fn run_step(
  runner: &dyn TaskRunner,
  verifier: &dyn Verifier,
  step: &Step,
  mut ctx: StepContext,
  timeout: Duration,
) -> StepRun {
  let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
  let max_attempts = step.max_retry_attempts.saturating_add(1);
  let mut attempt = 0;

  let outcome = loop {
    attempt += 1;
    ctx.attempt = attempt;

    let outcome = match tokio::time::timeout(timeout, runner.execute(step, &ctx)).await {
      Ok(outcome) => outcome,
      Err(_) => StepOutcome::failure(StepError::Timeout { timeout_ms }),
    };

    let error = match outcome.into_result() {
      Ok(output) => {
        break StepOutcome {
          ok: true,
          output,
          error: None,
        };
      }
      Err(error) => error,
    };

    if error.is_retryable() && attempt < max_attempts {
      warn!(
        execution_id = %ctx.execution_id,
        step_id = %step.id,
        attempt,
        error = %error,
        "step_retrying"
      );
      continue;
    }
    return StepRun::failed(attempt, error);
  };

  let Some(check) = &step.verification else {
    return StepRun {
      attempts: attempt,
      output: outcome.output,
      verdict: None,
      error: None,
    };
  };

  let mut verdict = match tokio::time::timeout(timeout, verifier.check(step, &outcome)).await {
    Ok(verdict) => verdict,
    Err(_) => {
      return StepRun {
        attempts: attempt,
        output: outcome.output,
        verdict: None,
        error: Some(StepError::Timeout { timeout_ms }),
      };
    }
  };

  let error = if verdict.passed {
    None
  } else {
    let detail = verdict
      .detail
      .get_or_insert_with(|| format!("check '{}' did not pass", check.check))
      .clone();
    Some(StepError::VerificationFailed { detail })
  };

  StepRun {
    attempts: attempt,
    output: outcome.output,
    verdict: Some(verdict),
    error,
  }
}

fn slot<'a>(
  results: &'a mut HashMap<String, StepResult>,
  step_id: &str,
) -> Result<&'a mut StepResult, ExecutionError> {
  results
    .get_mut(step_id)
    .ok_or_else(|| ExecutionError::Dispatch {
      message: format!("no result recorded for step '{}'", step_id),
    })
}

fn status(step_id: &str, results: &HashMap<String, StepResult>) -> Option<StepStatus> {
  results.get(step_id).map(StepResult::status)
}

fn is_pending(step_id: &str, results: &HashMap<String, StepResult>) -> bool {
  status(step_id, results) == Some(StepStatus::Pending)
}

fn is_ready(step: &Step, results: &HashMap<String, StepResult>) -> bool {
  is_pending(&step.id, results)
    && step
      .depends_on
      .iter()
      .all(|dep| status(dep, results) == Some(StepStatus::Success))
}

/// The first dependency, in declared order, that failed or was skipped.
fn blocked_reason(step: &Step, results: &HashMap<String, StepResult>) -> Option<SkipReason> {
  step
    .depends_on
    .iter()
    .find_map(|dep| match status(dep, results) {
      Some(StepStatus::Failed) => Some(SkipReason::DependencyFailed(dep.clone())),
      Some(StepStatus::Skipped) => Some(SkipReason::DependencySkipped(dep.clone())),
      _ => None,
    })
}

fn upstream_outputs(step: &Step, results: &HashMap<String, StepResult>) -> BTreeMap<String, Value> {
  step
    .depends_on
    .iter()
    .map(|dep| {
      let output = results
        .get(dep)
        .and_then(|r| r.output().cloned())
        .unwrap_or(Value::Null);
      (dep.clone(), output)
    })
    .collect()
}
