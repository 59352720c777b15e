//! Override artifact generation
//!
//! Synthesizes the engine-level override files implied by a resolved
//! configuration and persists them under the user-data directory, keyed by
//! identity. Artifacts are derived data: they are regenerated on every
//! `up`, and their presence or absence never participates in the reuse
//! decision — that belongs to the identity match alone.
//!
//! Layout: `<userDataFolder>/engine-overrides/<kind>-<identity>.yml`.
//! Compose configs with features produce a build override and a feature-
//! injection override; compose configs without features produce a single
//! start override carrying labels and environment; image-only configs
//! produce nothing.

use crate::config::ResolvedConfig;
use crate::errors::{Result, StevedoreError};
use crate::identity::ContainerIdentity;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Subdirectory of the user-data folder holding override artifacts
pub const OVERRIDES_SUBDIR: &str = "engine-overrides";

/// The kinds of override artifact the generator can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Build-time customization for the primary service
    Build,
    /// Feature injection: identity labels plus merged environment
    ContainerFeatures,
    /// Start-time overrides applied without rebuilding
    Start,
}

impl ArtifactKind {
    /// Artifact file name with the identity embedded
    pub fn file_name(&self, identity_id: &str) -> String {
        let kind = match self {
            ArtifactKind::Build => "build",
            ArtifactKind::ContainerFeatures => "containerFeatures",
            ArtifactKind::Start => "start",
        };
        format!("docker-compose.{}-{}.yml", kind, identity_id)
    }
}

/// One persisted override artifact
#[derive(Debug, Clone)]
pub struct OverrideArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// The set of artifacts generated for one identity
#[derive(Debug, Clone, Default)]
pub struct OverrideArtifactSet {
    pub artifacts: Vec<OverrideArtifact>,
}

impl OverrideArtifactSet {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Artifact file paths in generation order, for the compose file list
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

/// The override directory under a user-data folder
pub fn overrides_dir(user_data_dir: &Path) -> PathBuf {
    user_data_dir.join(OVERRIDES_SUBDIR)
}

/// Platform default user-data folder, used when the caller supplies none
pub fn default_user_data_dir() -> PathBuf {
    directories_next::ProjectDirs::from("", "", "stevedore")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("stevedore"))
}

/// Generate the override artifacts for `resolved` under `user_data_dir`,
/// creating the directory if absent. Stale artifacts for other identities
/// are left alone; files for this identity are rewritten.
#[instrument(skip(resolved, identity))]
pub fn generate(
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
    user_data_dir: &Path,
) -> Result<OverrideArtifactSet> {
    if !resolved.uses_compose() {
        debug!("Image-based configuration; no override artifacts needed");
        return Ok(OverrideArtifactSet::default());
    }

    let dir = overrides_dir(user_data_dir);
    std::fs::create_dir_all(&dir).map_err(|e| {
        StevedoreError::Internal(format!(
            "failed to create override directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let service = resolved.service().unwrap_or("app");
    let identity_id = identity.id();
    let mut set = OverrideArtifactSet::default();

    if resolved.features.is_empty() {
        let path = dir.join(ArtifactKind::Start.file_name(&identity_id));
        write_artifact(&path, &injection_yaml(service, resolved, identity))?;
        set.artifacts.push(OverrideArtifact {
            kind: ArtifactKind::Start,
            path,
        });
    } else {
        let build_path = dir.join(ArtifactKind::Build.file_name(&identity_id));
        write_artifact(&build_path, &build_yaml(service, resolved))?;
        set.artifacts.push(OverrideArtifact {
            kind: ArtifactKind::Build,
            path: build_path,
        });

        let features_path =
            dir.join(ArtifactKind::ContainerFeatures.file_name(&identity_id));
        write_artifact(&features_path, &injection_yaml(service, resolved, identity))?;
        set.artifacts.push(OverrideArtifact {
            kind: ArtifactKind::ContainerFeatures,
            path: features_path,
        });
    }

    debug!(
        "Generated {} override artifact(s) under {}",
        set.artifacts.len(),
        dir.display()
    );
    Ok(set)
}

fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| {
        StevedoreError::Internal(format!(
            "failed to write override artifact {}: {}",
            path.display(),
            e
        ))
    })
}

/// Build override: build arguments for the primary service, including the
/// declared feature list. When the spec declares no build customization of
/// its own (image-backed service), the arguments go under an inert
/// `x-stevedore-build` extension block so the engine never attempts a
/// build it has no context for.
fn build_yaml(service: &str, resolved: &ResolvedConfig) -> String {
    let declares_build =
        resolved.spec.build.is_some() || resolved.spec.dockerfile.is_some();

    let mut yaml = String::from("services:\n");
    yaml.push_str(&format!("  {}:\n", service));
    if declares_build {
        yaml.push_str("    build:\n");
        yaml.push_str("      args:\n");
    } else {
        yaml.push_str("    x-stevedore-build:\n");
        yaml.push_str("      args:\n");
    }

    if let Some(build) = &resolved.spec.build {
        for (key, value) in &build.args {
            yaml.push_str(&format!("        {}: {}\n", key, yaml_quote(value)));
        }
    }
    let feature_ids: Vec<&str> = resolved.features.iter().map(|f| f.id()).collect();
    yaml.push_str(&format!(
        "        STEVEDORE_FEATURES: {}\n",
        yaml_quote(&feature_ids.join(","))
    ));

    yaml
}

/// Injection override: identity labels and the merged environment for the
/// primary service. This is how compose-managed containers come to carry
/// the identity labels the matcher queries.
fn injection_yaml(
    service: &str,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
) -> String {
    let mut yaml = String::from("services:\n");
    yaml.push_str(&format!("  {}:\n", service));

    yaml.push_str("    labels:\n");
    for (key, value) in identity.labels() {
        yaml.push_str(&format!("      {}: {}\n", key, yaml_quote(&value)));
    }

    let merged = resolved.merged_env();
    if !merged.is_empty() {
        yaml.push_str("    environment:\n");
        for (key, value) in &merged {
            yaml.push_str(&format!("      {}: {}\n", key, yaml_quote(value)));
        }
    }

    yaml
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
