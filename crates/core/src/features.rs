//! Feature module metadata
//!
//! Features are reusable modules layered onto a base spec. Each feature is
//! a workspace-local directory carrying a `feature.json` metadata file that
//! may declare default environment entries, an install command, lifecycle
//! commands, and an install-order hint. Declaration order in the base spec
//! is authoritative for installation; `installsAfter` is surfaced in debug
//! logs but never reorders.

use crate::env::EnvEntry;
use crate::errors::{FeatureError, Result};
use crate::lifecycle::CommandSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Feature metadata file name inside a feature directory
pub const FEATURE_METADATA_FILE: &str = "feature.json";

/// Parsed contents of a feature's metadata file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMetadata {
    /// Feature identifier; must match the directory the metadata lives in
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Default environment entries contributed by this feature.
    /// Applied before base-spec values in the overlay fold.
    #[serde(default)]
    pub container_env: IndexMap<String, EnvEntry>,

    /// Command executed inside the container to install the feature
    #[serde(default)]
    pub install_command: Option<CommandSpec>,

    /// Lifecycle command run after creation, before the base spec's own
    /// postCreate command
    #[serde(default)]
    pub post_create_command: Option<CommandSpec>,

    /// Install-order hint: ids this feature prefers to follow.
    /// Recorded and logged, not used for reordering.
    #[serde(default)]
    pub installs_after: Vec<String>,
}

/// A feature resolved against the workspace: metadata plus its source
/// directory and the option values the base spec supplied for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFeature {
    pub metadata: FeatureMetadata,
    pub source_dir: PathBuf,
    pub options: serde_json::Value,
}

impl ResolvedFeature {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Option values rendered as environment variables for the install
    /// step: scalar options become `<OPTION>` upper-cased with `-` mapped
    /// to `_`, as install scripts expect.
    pub fn option_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        if let serde_json::Value::Object(map) = &self.options {
            for (key, value) in map {
                let name = key.replace('-', "_").to_uppercase();
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    other => other.to_string(),
                };
                env.insert(name, rendered);
            }
        }
        env
    }
}

/// Load a feature from a directory containing `feature.json`.
pub fn load_feature(
    feature_dir: &Path,
    declared_id: &str,
    options: serde_json::Value,
) -> Result<ResolvedFeature> {
    let metadata_path = feature_dir.join(FEATURE_METADATA_FILE);
    debug!(
        "Loading feature metadata from {}",
        metadata_path.display()
    );

    if !metadata_path.exists() {
        return Err(FeatureError::NotFound {
            path: metadata_path.display().to_string(),
        }
        .into());
    }

    let raw = std::fs::read_to_string(&metadata_path).map_err(|e| FeatureError::Parsing {
        path: metadata_path.display().to_string(),
        message: e.to_string(),
    })?;

    let metadata: FeatureMetadata =
        json5::from_str(&raw).map_err(|e| FeatureError::Parsing {
            path: metadata_path.display().to_string(),
            message: e.to_string(),
        })?;

    if metadata.id.is_empty() {
        return Err(FeatureError::Validation {
            message: format!(
                "feature at {} has an empty id",
                feature_dir.display()
            ),
        }
        .into());
    }
    if metadata.id != declared_id {
        warn!(
            "Feature id '{}' does not match its declaration '{}'; using declared id for ordering",
            metadata.id, declared_id
        );
    }
    if !metadata.installs_after.is_empty() {
        debug!(
            feature = %metadata.id,
            installs_after = ?metadata.installs_after,
            "Feature declares an install-order hint; declaration order remains authoritative"
        );
    }

    Ok(ResolvedFeature {
        metadata,
        source_dir: feature_dir.to_path_buf(),
        options,
    })
}
