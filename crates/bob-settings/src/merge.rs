//! Merging proposed configuration into what a user already has.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How scalar conflicts are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicy {
  /// Keep the existing value when both sides hold a scalar or the types
  /// differ. Maps always recurse and lists always union.
  pub prefer_existing: bool,
}

impl MergePolicy {
  pub fn prefer_existing() -> Self {
    Self {
      prefer_existing: true,
    }
  }

  pub fn prefer_proposed() -> Self {
    Self {
      prefer_existing: false,
    }
  }
}

impl Default for MergePolicy {
  fn default() -> Self {
    Self::prefer_existing()
  }
}

/// Merge `proposed` into `existing` without mutating either.
///
/// - keys only in `existing` are kept
/// - keys only in `proposed` are copied
/// - maps recurse
/// - lists keep every existing item in order, then append proposed items not
///   already present (compared structurally)
/// - anything else resolves by `policy`
///
/// Merging the same proposal twice gives the same tree as merging it once.
pub fn merge(existing: &Value, proposed: &Value, policy: MergePolicy) -> Value {
  match (existing, proposed) {
    (Value::Object(existing), Value::Object(proposed)) => {
      Value::Object(merge_maps(existing, proposed, policy))
    }
    (Value::Array(existing), Value::Array(proposed)) => Value::Array(union(existing, proposed)),
    _ if policy.prefer_existing => existing.clone(),
    _ => proposed.clone(),
  }
}

fn merge_maps(
  existing: &Map<String, Value>,
  proposed: &Map<String, Value>,
  policy: MergePolicy,
) -> Map<String, Value> {
  let mut out = existing.clone();

  for (key, proposed_value) in proposed {
    let merged = match existing.get(key) {
      Some(existing_value) => merge(existing_value, proposed_value, policy),
      None => proposed_value.clone(),
    };
    out.insert(key.clone(), merged);
  }

  out
}

fn union(existing: &[Value], proposed: &[Value]) -> Vec<Value> {
  let mut out = existing.to_vec();
  for item in proposed {
    if !out.contains(item) {
      out.push(item.clone());
    }
  }
  out
}

/// Whether merging `proposed` would change `existing`.
pub fn would_change(existing: &Value, proposed: &Value, policy: MergePolicy) -> bool {
  merge(existing, proposed, policy) != *existing
}
