//! Named configuration presets for coding agents.

use std::path::Path;

use bob_config::{AgentTarget, validate_target_dir};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::SettingsError;
use crate::merge::MergePolicy;
use crate::store::{MergeReport, SettingsStore, merge_file};

/// A named settings proposal with one tree per agent target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
  pub name: &'static str,
  pub description: &'static str,
  pub best_for: &'static str,
  claude_code: Value,
  cursor: Value,
}

impl Preset {
  /// The proposed settings tree for `agent`.
  pub fn config_for(&self, agent: AgentTarget) -> &Value {
    match agent {
      AgentTarget::ClaudeCode => &self.claude_code,
      AgentTarget::Cursor => &self.cursor,
    }
  }
}

pub const PRESET_NAMES: [&str; 3] = ["development-team", "solo-developer", "enterprise-security"];

/// All presets, in a fixed order.
pub fn list() -> Vec<Preset> {
  vec![development_team(), solo_developer(), enterprise_security()]
}

/// Look up a preset by name.
pub fn get(name: &str) -> Result<Preset, SettingsError> {
  list()
    .into_iter()
    .find(|p| p.name == name)
    .ok_or_else(|| SettingsError::UnknownPreset {
      name: name.to_string(),
      available: PRESET_NAMES.to_vec(),
    })
}

/// Merge a preset into the agent's settings file under `root`.
///
/// Goes through the merger, so settings the user already has are kept
/// according to `policy`.
pub async fn apply(
  store: &dyn SettingsStore,
  preset: &Preset,
  agent: AgentTarget,
  root: &Path,
  policy: MergePolicy,
) -> Result<MergeReport, SettingsError> {
  validate_target_dir(root).await?;
  let path = root.join(agent.settings_path());
  merge_file(store, &path, preset.config_for(agent), policy).await
}

fn development_team() -> Preset {
  Preset {
    name: "development-team",
    description: "Optimized for 2-5 developers with established CI/CD and code review process",
    best_for: "Team collaboration, code quality focus, established development practices",
    claude_code: json!({
      "defaultMode": "plan",
      "autoApprove": false,
      "confirmBeforeToolUse": true,
      "tools": {
        "thinking": true,
        "allowedTools": ["Read", "Write", "Edit", "MultiEdit", "Bash", "Task"],
        "bashTimeout": 90,
        "maxFileSize": "1MB"
      },
      "permissions": {
        "allowedCommands": [
          "git status", "git diff", "git add .", "git commit -m",
          "cargo test", "cargo fmt", "cargo clippy",
          "pytest", "npm test", "npm run lint", "npm run build",
          "ls", "find", "grep", "cat", "head", "tail"
        ],
        "restrictedPaths": [".env*", "secrets.yml", "*.key", "*.pem"],
        "requireApprovalFor": ["git push", "npm publish", "pip install"]
      },
      "collaboration": {
        "autoCommit": false,
        "requireCommitMessage": true,
        "notifyOnLargeChanges": 50,
        "branchProtection": true
      },
      "quality": {
        "runTestsAfterChanges": true,
        "formatCodeOnSave": true,
        "requireLintingPass": true,
        "autoFixLintIssues": true
      }
    }),
    cursor: json!({
      "chat.mode": "plan-first",
      "agent.alwaysConfirm": true,
      "agent.maxIterations": 10,
      "files.autoSave": "afterDelay",
      "editor.formatOnSave": true,
      "rules": {
        "development-workflow": "enabled",
        "code-standards": "enabled",
        "project-structure": "enabled",
        "logging-patterns": "enabled",
        "team-collaboration": "enabled"
      }
    }),
  }
}

fn solo_developer() -> Preset {
  Preset {
    name: "solo-developer",
    description: "Streamlined for individual developers doing rapid prototyping and personal projects",
    best_for: "Speed and efficiency, personal projects, rapid iteration, minimal overhead",
    claude_code: json!({
      "defaultMode": "code",
      "autoApprove": false,
      "confirmBeforeToolUse": false,
      "tools": {
        "thinking": false,
        "allowedTools": ["Read", "Write", "Edit", "MultiEdit", "Bash"],
        "bashTimeout": 45,
        "parallelOperations": true
      },
      "permissions": {
        "allowedCommands": [
          "git status", "git add .", "git commit -m", "git push",
          "cargo build", "cargo test", "pytest -x", "npm test", "npm run dev",
          "ls", "find", "grep", "cat", "mkdir", "mv", "cp"
        ],
        "autoApprovePatterns": ["git add", "git commit", "format*", "lint*"],
        "restrictedCommands": ["rm -rf", "sudo", "curl", "wget"]
      },
      "workflow": {
        "fastCommits": true,
        "autoCommitOnSuccess": false,
        "smartFormatting": true,
        "autoInstallDependencies": true
      }
    }),
    cursor: json!({
      "chat.mode": "code-first",
      "agent.alwaysConfirm": false,
      "agent.maxIterations": 15,
      "files.autoSave": "onFocusChange",
      "editor.formatOnSave": true,
      "rules": {
        "development-workflow": "streamlined",
        "code-standards": "relaxed",
        "quick-iteration": "enabled"
      }
    }),
  }
}

fn enterprise_security() -> Preset {
  Preset {
    name: "enterprise-security",
    description: "High-security configuration for large teams in regulated environments",
    best_for: "Regulated environments, large teams, production systems, compliance requirements",
    claude_code: json!({
      "defaultMode": "plan",
      "autoApprove": false,
      "confirmBeforeToolUse": true,
      "requireExplicitApproval": true,
      "tools": {
        "thinking": true,
        "allowedTools": ["Read", "Edit", "Task"],
        "restrictedBash": true,
        "bashTimeout": 30,
        "logAllOperations": true
      },
      "permissions": {
        "allowedCommands": [
          "git status", "git diff --name-only", "pytest --collect-only",
          "npm audit", "ls", "find . -name", "grep -n", "head", "tail"
        ],
        "deniedCommands": [
          "git push", "npm publish", "pip install", "npm install",
          "curl", "wget", "chmod", "chown", "sudo", "rm"
        ],
        "requireApprovalFor": "*"
      },
      "security": {
        "sandboxMode": true,
        "fileAccessControl": "whitelist",
        "allowedDirectories": ["./src/", "./tests/", "./docs/"],
        "sessionTimeout": 1800
      },
      "validation": {
        "requireTestsForChanges": true,
        "codeReviewRequired": true,
        "complianceChecks": ["pii-scan", "secret-scan", "license-check"]
      }
    }),
    cursor: json!({
      "chat.mode": "plan-first",
      "agent.alwaysConfirm": true,
      "agent.requireApproval": true,
      "agent.maxIterations": 5,
      "files.autoSave": "never",
      "editor.formatOnSave": false,
      "rules": {
        "security-first": "enabled",
        "compliance": "enabled",
        "audit-logging": "enabled",
        "restricted-access": "enabled"
      }
    }),
  }
}
