use std::sync::Arc;

use async_trait::async_trait;
use bob_workflow::Step;

use crate::error::RunnerError;
use crate::outcome::{StepContext, StepOutcome, Verdict};

/// Executes steps on behalf of the workflow executor.
///
/// The executor calls `acquire` once before the first step of a run and
/// `release` once after the last, on every exit path.
#[async_trait]
pub trait TaskRunner: Send + Sync {
  async fn acquire(&self) -> Result<(), RunnerError> {
    Ok(())
  }

  /// Run one attempt of a step. Failures are reported in the outcome.
  async fn execute(&self, step: &Step, ctx: &StepContext) -> StepOutcome;

  async fn release(&self) {}
}

/// Decides whether a step that ran actually achieved its objective.
#[async_trait]
pub trait Verifier: Send + Sync {
  async fn check(&self, step: &Step, outcome: &StepOutcome) -> Verdict;
}

#[async_trait]
impl<T: TaskRunner + ?Sized> TaskRunner for Arc<T> {
  async fn acquire(&self) -> Result<(), RunnerError> {
    (**self).acquire().await
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> StepOutcome {
    (**self).execute(step, ctx).await
  }

  async fn release(&self) {
    (**self).release().await
  }
}

#[async_trait]
impl<T: Verifier + ?Sized> Verifier for Arc<T> {
  async fn check(&self, step: &Step, outcome: &StepOutcome) -> Verdict {
    (**self).check(step, outcome).await
  }
}
