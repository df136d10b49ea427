//! Execution events and notifiers for observability.
//!
//! Events are emitted during workflow execution to allow consumers to observe
//! progress, persist state, stream to UIs, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// Workflow execution has started.
  WorkflowStarted {
    execution_id: String,
    workflow: String,
  },

  /// A step has been dispatched to the runner.
  StepStarted {
    execution_id: String,
    step_id: String,
  },

  /// A step succeeded (and passed verification, if it declares one).
  StepCompleted {
    execution_id: String,
    step_id: String,
    output: Option<serde_json::Value>,
  },

  /// A step failed.
  StepFailed {
    execution_id: String,
    step_id: String,
    error: String,
  },

  /// A step will not run.
  StepSkipped {
    execution_id: String,
    step_id: String,
    reason: String,
  },

  /// Every step reached a terminal state.
  WorkflowCompleted {
    execution_id: String,
    success: bool,
    cancelled: bool,
  },

  /// The run stopped before or outside step execution.
  WorkflowFailed { execution_id: String, error: String },
}

/// Trait for receiving execution events.
///
/// The executor calls `notify` for each event; implementations decide
/// what to do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Sends never block the executor.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
