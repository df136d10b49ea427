//! Error types for workflow execution.

use bob_task::{RunnerError, TransitionError};
use thiserror::Error;

/// Errors that stop a run as a whole.
///
/// Step failures are not errors here; they are recorded in the step's
/// result.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// The task runner session could not be acquired. No step ran.
  #[error("failed to acquire task runner: {0}")]
  Acquire(#[source] RunnerError),

  /// A step result was asked to make an illegal status change.
  #[error("invalid step state: {0}")]
  State(#[from] TransitionError),

  /// The dispatcher lost its concurrency permits.
  #[error("step dispatch failed: {message}")]
  Dispatch { message: String },
}
