use std::collections::HashMap;

use bob_config::WorkflowDef;

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::step::Step;

/// A validated workflow with a fixed execution order.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub name: String,
  pub description: Option<String>,
  pub timeout_ms: Option<u64>,
  pub max_concurrency: Option<usize>,
  /// Steps in declaration order.
  steps: Vec<Step>,
  index: HashMap<String, usize>,
  order: Vec<String>,
  graph: Graph,
}

impl Workflow {
  /// Validate a definition and compute its execution order.
  ///
  /// Fails on duplicate ids, dependencies on unknown steps and cycles. No
  /// partial ordering is returned.
  pub fn build(def: WorkflowDef) -> Result<Self, WorkflowError> {
    if def.max_concurrency == Some(0) {
      return Err(WorkflowError::InvalidSetting(
        "maxConcurrency must be at least 1".to_string(),
      ));
    }

    let mut steps = Vec::with_capacity(def.steps.len());
    let mut index = HashMap::with_capacity(def.steps.len());

    for step_def in def.steps {
      let step = Step::from_def(step_def)?;
      if index.contains_key(&step.id) {
        return Err(WorkflowError::DuplicateStep(step.id));
      }
      index.insert(step.id.clone(), steps.len());
      steps.push(step);
    }

    for step in &steps {
      if let Some(dependency) = step.depends_on.iter().find(|d| !index.contains_key(*d)) {
        return Err(WorkflowError::UnknownDependency {
          step_id: step.id.clone(),
          dependency: dependency.clone(),
        });
      }
    }

    let graph = Graph::new(&steps);
    let order = graph.topological_order()?;

    Ok(Self {
      name: def.name,
      description: def.description,
      timeout_ms: def.timeout_ms,
      max_concurrency: def.max_concurrency,
      steps,
      index,
      order,
      graph,
    })
  }

  /// Steps in declaration order.
  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  /// Get a step by id.
  pub fn get_step(&self, step_id: &str) -> Option<&Step> {
    self.index.get(step_id).map(|&i| &self.steps[i])
  }

  /// Step ids in execution order.
  pub fn execution_order(&self) -> &[String] {
    &self.order
  }

  /// Steps in execution order.
  pub fn ordered_steps(&self) -> impl Iterator<Item = &Step> + '_ {
    self.order.iter().filter_map(|id| self.get_step(id))
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}
