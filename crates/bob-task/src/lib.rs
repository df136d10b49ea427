//! Bob Task
//!
//! The per-step result model shared by the executor and its callers, and the
//! contracts for the collaborators that run and verify steps.

mod error;
mod outcome;
mod result;
mod runner;
mod status;

pub use error::{RunnerError, StepError};
pub use outcome::{StepContext, StepOutcome, Verdict};
pub use result::{StepResult, WorkflowRunResult};
pub use runner::{TaskRunner, Verifier};
pub use status::{SkipReason, StepStatus, TransitionError, VerificationStatus};
