use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::WorkflowError;
use crate::step::Step;

/// Dependency graph for ordering and traversal.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Step ids in declaration order.
  declared: Vec<String>,
  /// Adjacency list: step_id -> steps that depend on it.
  dependents: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step_id -> steps it depends on.
  dependencies: HashMap<String, Vec<String>>,
  /// Steps with no dependencies, in declaration order.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from steps whose dependencies have already been checked
  /// to reference known ids.
  pub fn new(steps: &[Step]) -> Self {
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();

    for step in steps {
      dependents.entry(step.id.clone()).or_default();
      dependencies.insert(step.id.clone(), step.depends_on.clone());
    }

    for step in steps {
      for dep in &step.depends_on {
        dependents
          .entry(dep.clone())
          .or_default()
          .push(step.id.clone());
      }
    }

    let entry_points = steps
      .iter()
      .filter(|s| s.depends_on.is_empty())
      .map(|s| s.id.clone())
      .collect();

    Self {
      declared: steps.iter().map(|s| s.id.clone()).collect(),
      dependents,
      dependencies,
      entry_points,
    }
  }

  /// Steps with no dependencies.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Steps that directly depend on `step_id`.
  pub fn dependents(&self, step_id: &str) -> &[String] {
    self
      .dependents
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Steps that `step_id` directly depends on.
  pub fn dependencies(&self, step_id: &str) -> &[String] {
    self
      .dependencies
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every step that depends on `step_id`, directly or transitively,
  /// in breadth-first order.
  pub fn transitive_dependents(&self, step_id: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([step_id]);
    let mut out = Vec::new();

    while let Some(current) = queue.pop_front() {
      for next in self.dependents(current) {
        if seen.insert(next.as_str()) {
          out.push(next.clone());
          queue.push_back(next.as_str());
        }
      }
    }

    out
  }

  /// Total execution order. Every step comes after all of its dependencies;
  /// independent steps keep their declaration order.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let position: HashMap<&str, usize> = self
      .declared
      .iter()
      .enumerate()
      .map(|(i, id)| (id.as_str(), i))
      .collect();

    let mut in_degree: HashMap<&str, usize> = self
      .declared
      .iter()
      .map(|id| (id.as_str(), self.dependencies(id).len()))
      .collect();

    // Min-heap on declaration index
    let mut ready: BinaryHeap<Reverse<usize>> = self
      .declared
      .iter()
      .enumerate()
      .filter(|(_, id)| in_degree[id.as_str()] == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.declared.len());

    while let Some(Reverse(i)) = ready.pop() {
      let id = &self.declared[i];
      order.push(id.clone());

      for dependent in self.dependents(id) {
        if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            ready.push(Reverse(position[dependent.as_str()]));
          }
        }
      }
    }

    if order.len() < self.declared.len() {
      let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
      return Err(WorkflowError::Cycle {
        steps: self.find_cycle(&ordered, &position),
      });
    }

    Ok(order)
  }

  /// Walk dependency edges among the steps Kahn's algorithm could not place
  /// until a step repeats. Every such step has at least one unplaced
  /// dependency, so the walk always closes a loop.
  fn find_cycle(&self, ordered: &HashSet<&str>, position: &HashMap<&str, usize>) -> Vec<String> {
    let Some(start) = self
      .declared
      .iter()
      .find(|id| !ordered.contains(id.as_str()))
    else {
      return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut on_path: HashMap<&str, usize> = HashMap::new();
    let mut current = start.as_str();

    let cycle: Vec<&str> = loop {
      if let Some(&at) = on_path.get(current) {
        break path[at..].to_vec();
      }
      on_path.insert(current, path.len());
      path.push(current);

      match self
        .dependencies(current)
        .iter()
        .find(|d| !ordered.contains(d.as_str()))
      {
        Some(next) => current = next.as_str(),
        None => break Vec::new(),
      }
    };

    // Rotate so the cycle starts at the step declared first
    let start_at = cycle
      .iter()
      .enumerate()
      .min_by_key(|(_, id)| position.get(*id).copied().unwrap_or(usize::MAX))
      .map(|(i, _)| i)
      .unwrap_or(0);

    cycle[start_at..]
      .iter()
      .chain(cycle[..start_at].iter())
      .map(|s| s.to_string())
      .collect()
  }
}
