//! Bob Workflow Engine
//!
//! Executes validated workflows step by step, in dependency order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowExecutor                         │
//! │  - execute(workflow, cancel) → WorkflowRunResult            │
//! │  - wave scheduling, timeouts, retries, critical abort       │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │   TaskRunner              │   │   Verifier                │
//! │  - BuiltinRunner          │   │  - BuiltinVerifier        │
//! │    (merge / render /      │   │                           │
//! │     preset / echo)        │   │                           │
//! │  - CommandRunner (agent)  │   │                           │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bob_engine::{BuiltinRunner, BuiltinVerifier, CommandRunner, ExecutorConfig, WorkflowExecutor};
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = BuiltinRunner::new(CommandRunner::new("my-agent"), ".");
//! let executor = WorkflowExecutor::new(
//!   Arc::new(runner),
//!   Arc::new(BuiltinVerifier::new(".")),
//!   ExecutorConfig::default(),
//! );
//!
//! let result = executor.execute(&workflow, CancellationToken::new()).await?;
//! println!("{}", result.report());
//! ```

mod builtin;
mod command;
mod error;
mod events;
mod executor;
mod verify;

pub use builtin::{BuiltinRunner, NoAgentRunner};
pub use command::CommandRunner;
pub use error::ExecutionError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{DEFAULT_MAX_CONCURRENCY, DEFAULT_STEP_TIMEOUT, ExecutorConfig, WorkflowExecutor};
pub use verify::BuiltinVerifier;
