//! Configuration resolution
//!
//! Loads the workspace's declarative container spec and merges it with
//! referenced feature metadata and invocation-layer values into one
//! `ResolvedConfig`. Parsing is JSON-with-comments via json5; unknown
//! fields are logged at DEBUG and otherwise ignored. Resolution is a pure
//! transform over on-disk inputs.
//!
//! Discovery walks upward from the workspace root, probing at each level:
//! `.devcontainer/devcontainer.json`, `.devcontainer/devcontainer.jsonc`,
//! `.devcontainer.json`, `.devcontainer.jsonc`.

use crate::env::{EnvEntry, EnvFragment, EnvOverlay};
use crate::errors::{ConfigError, Result};
use crate::features::{load_feature, ResolvedFeature};
use crate::lifecycle::CommandSpec;
use crate::variable::SubstitutionContext;
use crate::workspace::default_config_path;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Deserializer for fields accepting a single string or an array of
/// strings (`dockerComposeFile`).
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(vec![s]),
        Some(serde_json::Value::Array(items)) => {
            let mut result = Vec::new();
            for item in items {
                match item {
                    serde_json::Value::String(s) => result.push(s),
                    _ => {
                        return Err(D::Error::custom(
                            "dockerComposeFile array must contain only strings",
                        ))
                    }
                }
            }
            Ok(result)
        }
        Some(_) => Err(D::Error::custom(
            "dockerComposeFile must be a string or array of strings",
        )),
    }
}

/// Dockerfile build customization
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSection {
    /// Path to the Dockerfile relative to the config file
    pub dockerfile: Option<String>,
    /// Build context relative to the config file; defaults to the
    /// Dockerfile's directory
    pub context: Option<String>,
    /// Build arguments
    #[serde(default)]
    pub args: IndexMap<String, String>,
}

/// The declarative container specification as found on disk.
///
/// Exactly one base mode must be present: an image reference, a Dockerfile
/// (directly or via `build`), or a compose service set.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Human-readable name
    pub name: Option<String>,

    /// Base image reference
    pub image: Option<String>,

    /// Path to a Dockerfile relative to the config file
    #[serde(rename = "dockerFile", alias = "dockerfile")]
    pub dockerfile: Option<String>,

    /// Build customization (alternative Dockerfile location, context, args)
    pub build: Option<BuildSection>,

    /// Compose file(s); presence selects the compose flow
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub docker_compose_file: Vec<String>,

    /// Primary compose service
    pub service: Option<String>,

    /// Workspace folder inside the container
    pub workspace_folder: Option<String>,

    /// Environment overlay contributed by the base spec
    #[serde(default)]
    pub container_env: IndexMap<String, EnvEntry>,

    /// Feature references in declaration order, mapped to their options
    #[serde(default)]
    pub features: IndexMap<String, serde_json::Value>,

    /// Lifecycle commands
    pub on_create_command: Option<CommandSpec>,
    pub post_create_command: Option<CommandSpec>,
    pub post_start_command: Option<CommandSpec>,

    /// Unknown fields, retained for forward compatibility and logged at
    /// DEBUG during load
    #[serde(flatten)]
    pub unknown: IndexMap<String, serde_json::Value>,
}

impl ContainerSpec {
    pub fn uses_compose(&self) -> bool {
        !self.docker_compose_file.is_empty()
    }

    fn has_dockerfile(&self) -> bool {
        self.dockerfile.is_some()
            || self
                .build
                .as_ref()
                .map(|b| b.dockerfile.is_some())
                .unwrap_or(false)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.uses_compose() {
            if self.service.is_none() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "{} declares dockerComposeFile but no service",
                        path.display()
                    ),
                }
                .into());
            }
            return Ok(());
        }

        if self.image.is_none() && !self.has_dockerfile() {
            return Err(ConfigError::Validation {
                message: format!(
                    "{} declares no image, dockerfile, or compose service set",
                    path.display()
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Locate the declarative spec for a workspace, walking from the root
/// upward. Fails with `ConfigError::NotFound` naming the preferred
/// location under the workspace root.
#[instrument]
pub fn discover_config(workspace_root: &Path) -> Result<PathBuf> {
    let mut current = Some(workspace_root);
    while let Some(dir) = current {
        for candidate in [
            dir.join(".devcontainer").join("devcontainer.json"),
            dir.join(".devcontainer").join("devcontainer.jsonc"),
            dir.join(".devcontainer.json"),
            dir.join(".devcontainer.jsonc"),
        ] {
            if candidate.is_file() {
                debug!("Discovered configuration at {}", candidate.display());
                return Ok(candidate);
            }
        }
        current = dir.parent();
    }

    Err(ConfigError::NotFound {
        path: default_config_path(workspace_root).display().to_string(),
    }
    .into())
}

/// Load and validate a spec file (JSONC).
#[instrument]
pub fn load_spec(path: &Path) -> Result<ContainerSpec> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let spec: ContainerSpec = json5::from_str(&raw).map_err(|e| ConfigError::Parsing {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    for field in spec.unknown.keys() {
        debug!("Ignoring unknown configuration field: {}", field);
    }

    spec.validate(path)?;
    Ok(spec)
}

/// Invocation-layer inputs to resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Explicit config path; skips discovery when set
    pub config_path: Option<PathBuf>,
    /// Environment values supplied at invocation time; last merge layer
    pub invocation_env: IndexMap<String, String>,
    /// Dotfiles repository to provision after creation
    pub dotfiles_repository: Option<String>,
}

/// Merged view of the base spec, feature layers, and invocation overrides.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub spec: ContainerSpec,
    pub workspace_root: PathBuf,
    pub config_path: PathBuf,
    /// Features in declaration order
    pub features: Vec<ResolvedFeature>,
    /// Environment overlay in merge order
    pub env: EnvOverlay,
    pub dotfiles_repository: Option<String>,
}

impl ResolvedConfig {
    pub fn uses_compose(&self) -> bool {
        self.spec.uses_compose()
    }

    /// Compose files resolved relative to the config file's directory
    pub fn compose_files(&self) -> Vec<PathBuf> {
        let base = self.config_dir();
        self.spec
            .docker_compose_file
            .iter()
            .map(|f| base.join(f))
            .collect()
    }

    pub fn service(&self) -> Option<&str> {
        self.spec.service.as_deref()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace_root.clone())
    }

    /// Workspace folder inside the container
    pub fn container_workspace_folder(&self) -> String {
        container_workspace_folder(&self.spec, &self.workspace_root)
    }

    /// The effective environment, folded across all layers
    pub fn merged_env(&self) -> IndexMap<String, String> {
        self.env.merge()
    }
}

fn container_workspace_folder(spec: &ContainerSpec, workspace_root: &Path) -> String {
    spec.workspace_folder.clone().unwrap_or_else(|| {
        let dir_name = workspace_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        format!("/workspaces/{}", dir_name)
    })
}

/// Resolve the full configuration for a workspace.
///
/// Merge order for the environment overlay: feature-declared defaults,
/// then base-spec values, then invocation-layer values. Later layers win
/// on scalar key collision.
#[instrument(skip(options))]
pub fn resolve(workspace_root: &Path, options: ResolveOptions) -> Result<ResolvedConfig> {
    let config_path = match options.config_path {
        Some(path) => path,
        None => discover_config(workspace_root)?,
    };
    let mut spec = load_spec(&config_path)?;
    debug!("Loaded configuration: {:?}", spec.name);

    let substitution = SubstitutionContext::new(
        workspace_root,
        &container_workspace_folder(&spec, workspace_root),
    );

    // Substitute variables in env values and lifecycle commands before
    // anything derives from them (identity included).
    for entry in spec.container_env.values_mut() {
        *entry = substitute_entry(entry, &substitution);
    }
    spec.on_create_command = spec
        .on_create_command
        .map(|c| c.map_strings(|s| substitution.substitute(s)));
    spec.post_create_command = spec
        .post_create_command
        .map(|c| c.map_strings(|s| substitution.substitute(s)));
    spec.post_start_command = spec
        .post_start_command
        .map(|c| c.map_strings(|s| substitution.substitute(s)));

    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workspace_root.to_path_buf());

    let mut features = Vec::new();
    for (reference, feature_options) in &spec.features {
        let feature_dir = resolve_feature_dir(&config_dir, reference);
        let declared_id = reference
            .rsplit('/')
            .next()
            .unwrap_or(reference.as_str());
        let feature = load_feature(&feature_dir, declared_id, feature_options.clone())?;
        features.push(feature);
    }

    let mut env = EnvOverlay::default();
    for feature in &features {
        let mut fragment = EnvFragment::new(format!("feature:{}", feature.id()));
        for (name, entry) in &feature.metadata.container_env {
            fragment.insert(name.clone(), substitute_entry(entry, &substitution));
        }
        env.push(fragment);
    }
    let mut base_fragment = EnvFragment::new("base");
    for (name, entry) in &spec.container_env {
        base_fragment.insert(name.clone(), entry.clone());
    }
    env.push(base_fragment);
    let mut invocation_fragment = EnvFragment::new("invocation");
    for (name, value) in &options.invocation_env {
        invocation_fragment.insert(name.clone(), value.clone());
    }
    env.push(invocation_fragment);

    Ok(ResolvedConfig {
        spec,
        workspace_root: workspace_root.to_path_buf(),
        config_path,
        features,
        env,
        dotfiles_repository: options.dotfiles_repository,
    })
}

/// Feature references are paths relative to the config directory; bare
/// names resolve under its `features/` subdirectory.
fn resolve_feature_dir(config_dir: &Path, reference: &str) -> PathBuf {
    if reference.starts_with("./") || reference.starts_with("../") {
        config_dir.join(reference)
    } else {
        config_dir.join("features").join(reference)
    }
}

fn substitute_entry(entry: &EnvEntry, substitution: &SubstitutionContext) -> EnvEntry {
    match entry {
        EnvEntry::Plain(value) => EnvEntry::Plain(substitution.substitute(value)),
        EnvEntry::Detailed {
            value,
            policy,
            separator,
        } => EnvEntry::Detailed {
            value: substitution.substitute(value),
            policy: *policy,
            separator: separator.clone(),
        },
    }
}
