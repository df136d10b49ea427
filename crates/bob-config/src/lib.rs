//! Bob Config
//!
//! This crate contains the serializable workflow definition types for bob.
//! These types represent workflows before they are validated and ordered by
//! `bob-workflow`.
//!
//! Definitions can be loaded from:
//! - JSON files (`.json`)
//! - YAML files (`.yaml` / `.yml`)
//!
//! A definition is either a bare list of steps or an object with a `steps`
//! list plus workflow-wide defaults.

mod agent;
mod error;
mod format;
mod step;
mod target;
mod workflow;

pub use agent::AgentTarget;
pub use error::ConfigError;
pub use format::DocumentFormat;
pub use step::{Operation, StepDef, StepKind, VerificationRef};
pub use target::validate_target_dir;
pub use workflow::WorkflowDef;
