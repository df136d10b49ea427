//! Bob Workflow
//!
//! This crate provides the validated workflow representation for bob.
//! A [`Workflow`] is built from a `bob-config` definition and is ready for
//! execution.
//!
//! Key differences from `bob-config`:
//! - Step ids are unique and every dependency references a known step
//! - The dependency relation is a DAG (cycles are rejected with the steps
//!   that form them)
//! - A total execution order is fixed up front: dependencies first, ties
//!   broken by declaration order

mod error;
mod graph;
mod step;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use step::Step;
pub use workflow::Workflow;
