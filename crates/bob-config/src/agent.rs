use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The coding agent a generated artifact is meant for.
///
/// The agent decides where rules and settings live inside a target project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentTarget {
  ClaudeCode,
  Cursor,
}

impl AgentTarget {
  pub const ALL: [AgentTarget; 2] = [AgentTarget::ClaudeCode, AgentTarget::Cursor];

  pub fn name(&self) -> &'static str {
    match self {
      Self::ClaudeCode => "claude-code",
      Self::Cursor => "cursor",
    }
  }

  /// Rules file, relative to the target project root.
  pub fn rules_path(&self) -> &'static str {
    match self {
      Self::ClaudeCode => "CLAUDE.md",
      Self::Cursor => ".cursor/rules/coding-agent-rules.mdc",
    }
  }

  /// Settings file, relative to the target project root.
  pub fn settings_path(&self) -> &'static str {
    match self {
      Self::ClaudeCode => ".claude/settings.json",
      Self::Cursor => ".cursor/settings.json",
    }
  }

  /// Whether rules are written as a single file or a directory of files.
  pub fn output_format(&self) -> &'static str {
    match self {
      Self::ClaudeCode => "single_file",
      Self::Cursor => "multiple_files",
    }
  }

  /// Template variables every rules template receives for this agent.
  pub fn template_variables(&self) -> serde_json::Map<String, serde_json::Value> {
    let output_file = match self {
      Self::ClaudeCode => "CLAUDE.md",
      Self::Cursor => ".cursor/rules/",
    };

    let mut vars = serde_json::Map::new();
    vars.insert("agent_type".to_string(), self.name().into());
    vars.insert("output_file".to_string(), output_file.into());
    vars
  }

  pub fn supported() -> Vec<&'static str> {
    Self::ALL.iter().map(|a| a.name()).collect()
  }
}

impl fmt::Display for AgentTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for AgentTarget {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|a| a.name() == s)
      .ok_or_else(|| ConfigError::UnsupportedAgent {
        name: s.to_string(),
        supported: Self::supported(),
      })
  }
}
