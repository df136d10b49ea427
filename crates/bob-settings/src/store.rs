//! Reading and writing settings files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bob_config::DocumentFormat;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::SettingsError;
use crate::merge::{MergePolicy, merge};

/// Persistence for configuration trees.
#[async_trait]
pub trait SettingsStore: Send + Sync {
  /// Read and parse the file at `path`.
  ///
  /// Returns `Ok(None)` when there is no such file. Empty or
  /// whitespace-only files read as an empty map.
  async fn read_existing(&self, path: &Path) -> Result<Option<Value>, SettingsError>;

  /// Write `tree` to `path`, creating parent directories.
  async fn write(&self, path: &Path, tree: &Value) -> Result<(), SettingsError>;
}

/// Filesystem store. The format follows the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSettingsStore;

impl FsSettingsStore {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl SettingsStore for FsSettingsStore {
  async fn read_existing(&self, path: &Path) -> Result<Option<Value>, SettingsError> {
    let format = DocumentFormat::from_path(path)?;

    let text = match fs::read_to_string(path).await {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(SettingsError::io(path, e)),
    };

    parse_existing(&text, format, path).map(Some)
  }

  async fn write(&self, path: &Path, tree: &Value) -> Result<(), SettingsError> {
    let format = DocumentFormat::from_path(path)?;
    let text = format.to_string(tree)?;

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| SettingsError::io(parent, e))?;
    }

    fs::write(path, text)
      .await
      .map_err(|e| SettingsError::io(path, e))
  }
}

/// Parse an existing settings document.
///
/// Blank documents are an empty map. Anything unparseable is reported as
/// [`SettingsError::MalformedExisting`] so the caller never overwrites it.
pub fn parse_existing(
  text: &str,
  format: DocumentFormat,
  path: &Path,
) -> Result<Value, SettingsError> {
  if text.trim().is_empty() {
    return Ok(Value::Object(Default::default()));
  }

  format
    .parse(text)
    .map_err(|e| SettingsError::MalformedExisting {
      path: path.to_path_buf(),
      message: e.to_string(),
    })
}

/// What a read-modify-write did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
  pub path: PathBuf,
  /// The file did not exist before.
  pub created: bool,
  /// The merged tree differs from what was on disk.
  pub changed: bool,
  pub merged: Value,
}

/// Compute the merge of `proposed` into the file at `path` without writing.
pub async fn plan_merge(
  store: &dyn SettingsStore,
  path: &Path,
  proposed: &Value,
  policy: MergePolicy,
) -> Result<MergeReport, SettingsError> {
  let existing = store.read_existing(path).await?;
  let created = existing.is_none();
  let existing = existing.unwrap_or_else(|| Value::Object(Default::default()));
  let merged = merge(&existing, proposed, policy);

  Ok(MergeReport {
    path: path.to_path_buf(),
    created,
    changed: created || merged != existing,
    merged,
  })
}

/// Merge `proposed` into the file at `path` and write the result back.
///
/// A file that cannot be parsed is left untouched and the error returned.
/// Nothing is written when the merge changes nothing.
pub async fn merge_file(
  store: &dyn SettingsStore,
  path: &Path,
  proposed: &Value,
  policy: MergePolicy,
) -> Result<MergeReport, SettingsError> {
  let report = match plan_merge(store, path, proposed, policy).await {
    Ok(report) => report,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "settings_merge_failed");
      return Err(e);
    }
  };

  if report.changed {
    store.write(path, &report.merged).await?;
  }

  info!(
    path = %path.display(),
    created = report.created,
    changed = report.changed,
    "settings_merged"
  );
  Ok(report)
}

/// Move an unparseable file aside so a merge can start from scratch.
///
/// The file becomes `<name>.malformed`, or `<name>.malformed.N` with the
/// first free `N` when that name is taken. Returns the new path.
pub async fn preserve_malformed(path: &Path) -> Result<PathBuf, SettingsError> {
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();

  let mut candidate = path.with_file_name(format!("{}.malformed", file_name));
  let mut n = 1;
  while fs::try_exists(&candidate)
    .await
    .map_err(|e| SettingsError::io(&candidate, e))?
  {
    candidate = path.with_file_name(format!("{}.malformed.{}", file_name, n));
    n += 1;
  }

  fs::rename(path, &candidate)
    .await
    .map_err(|e| SettingsError::io(path, e))?;

  debug!(from = %path.display(), to = %candidate.display(), "malformed_settings_preserved");
  Ok(candidate)
}
