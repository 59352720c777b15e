//! Workspace root resolution
//!
//! Resolves the caller-supplied workspace path to a canonical root. The
//! canonical path feeds identity hashing, so two invocations naming the
//! same directory through different relative paths or symlinks agree on
//! one root.

use crate::errors::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the canonical workspace root path.
///
/// Fails with `ConfigError::NotFound` when the path does not exist; the
/// error message names the default config location under the attempted
/// path so downstream reporting can surface exactly what was missing.
pub fn resolve_workspace_root(path: &Path) -> Result<PathBuf> {
    debug!("Resolving workspace root for path: {}", path.display());

    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: default_config_path(path).display().to_string(),
        }
        .into());
    }

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    debug!("Workspace root: {}", canonical.display());
    Ok(canonical)
}

/// The preferred config location under a workspace root, used for
/// error messaging when discovery finds nothing.
pub fn default_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".devcontainer").join("devcontainer.json")
}
