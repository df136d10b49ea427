use std::path::Path;

use crate::error::ConfigError;

/// Check that `path` exists and is a directory before anything is written
/// beneath it.
pub async fn validate_target_dir(path: &Path) -> Result<(), ConfigError> {
  let invalid = |message: &str| ConfigError::InvalidTarget {
    path: path.to_path_buf(),
    message: message.to_string(),
  };

  match tokio::fs::metadata(path).await {
    Ok(meta) if meta.is_dir() => Ok(()),
    Ok(_) => Err(invalid("not a directory")),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(invalid("does not exist")),
    Err(e) => Err(invalid(&e.to_string())),
  }
}
