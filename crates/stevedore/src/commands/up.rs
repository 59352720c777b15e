//! Up command implementation
//!
//! The pipeline: resolve configuration, derive identity, persist override
//! artifacts, provision (build/start/reuse), run lifecycle hooks. Each
//! stage short-circuits on failure; the terminal state is mapped into the
//! single structured `UpResult` document.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stevedore_core::config::{resolve, ResolveOptions};
use stevedore_core::engine::CliEngine;
use stevedore_core::errors::{ConfigError, StevedoreError};
use stevedore_core::identity::ContainerIdentity;
use stevedore_core::lifecycle::run_lifecycle;
use stevedore_core::overrides;
use stevedore_core::provision;
use stevedore_core::workspace::resolve_workspace_root;
use stevedore_core::IndexMap;
use tracing::{debug, info, instrument};

/// Up command arguments
#[derive(Debug, Clone, Default)]
pub struct UpArgs {
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub user_data_folder: Option<PathBuf>,
    pub dotfiles_repository: Option<String>,
    /// `NAME=value` overrides applied as the last merge layer
    pub container_env: Vec<String>,
    pub docker_path: String,
}

/// Success payload emitted as JSON to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpSuccess {
    /// Always "success"
    pub outcome: String,
    /// ID of the created or reused container
    pub container_id: String,
    /// Compose project name (compose-based configurations only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_project_name: Option<String>,
}

/// Error payload emitted as JSON to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpError {
    /// Always "error"
    pub outcome: String,
    /// Message specific enough to name the failing resource
    pub message: String,
}

/// Union type enforcing the stdout contract: exactly one JSON document,
/// success or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpResult {
    Success(UpSuccess),
    Error(UpError),
}

/// Internal outcome passed from the pipeline to the reporter
#[derive(Debug, Clone)]
pub struct UpOutcome {
    pub container_id: String,
    pub compose_project_name: Option<String>,
}

impl From<UpOutcome> for UpResult {
    fn from(outcome: UpOutcome) -> Self {
        UpResult::Success(UpSuccess {
            outcome: "success".to_string(),
            container_id: outcome.container_id,
            compose_project_name: outcome.compose_project_name,
        })
    }
}

impl UpResult {
    /// Map a pipeline failure to the structured error outcome. Domain
    /// errors carry resource-specific messages already; anything else
    /// falls back to the rendered error chain.
    pub fn from_error(error: anyhow::Error) -> Self {
        let message = match error.downcast_ref::<StevedoreError>() {
            Some(StevedoreError::Config(config_error)) => format!("{}", config_error),
            Some(StevedoreError::Engine(engine_error)) => format!("{}", engine_error),
            Some(StevedoreError::Feature(feature_error)) => format!("{}", feature_error),
            Some(StevedoreError::Lifecycle(lifecycle_error)) => {
                format!("{}", lifecycle_error)
            }
            _ => format!("{:#}", error),
        };

        UpResult::Error(UpError {
            outcome: "error".to_string(),
            message,
        })
    }
}

/// Parse `NAME=value` environment overrides from the invocation layer.
fn parse_container_env(pairs: &[String]) -> Result<IndexMap<String, String>> {
    let mut env = IndexMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                env.insert(name.to_string(), value.to_string());
            }
            _ => {
                return Err(StevedoreError::Config(ConfigError::Validation {
                    message: format!(
                        "invalid --container-env '{}': expected NAME=value",
                        pair
                    ),
                })
                .into())
            }
        }
    }
    Ok(env)
}

/// Execute the up pipeline for a workspace.
#[instrument(skip(args))]
pub async fn execute_up(args: UpArgs) -> Result<UpOutcome> {
    debug!("Up args: {:?}", args);

    let workspace_input = args
        .workspace_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace_root = resolve_workspace_root(&workspace_input)?;

    let invocation_env = parse_container_env(&args.container_env)?;

    // Stage 1: configuration resolution (pure).
    let resolved = resolve(
        &workspace_root,
        ResolveOptions {
            config_path: args.config_path.clone(),
            invocation_env,
            dotfiles_repository: args.dotfiles_repository.clone(),
        },
    )?;
    info!(
        "Resolved configuration {} for {}",
        resolved.config_path.display(),
        workspace_root.display()
    );

    // Stage 2: identity derivation.
    let identity = ContainerIdentity::new(&resolved);

    // Stage 3: override artifacts, persisted under the user-data folder.
    // Derived data only; the reuse decision below never reads them.
    let user_data_dir = args
        .user_data_folder
        .clone()
        .unwrap_or_else(overrides::default_user_data_dir);
    let artifacts = overrides::generate(&resolved, &identity, &user_data_dir)?;
    debug!(
        "Override artifacts: {} file(s) under {}",
        artifacts.artifacts.len(),
        user_data_dir.display()
    );

    // Stage 4: provisioning.
    let engine = CliEngine::new(engine_path(&args.docker_path));
    let outcome = provision::up(&engine, &resolved, &identity, &artifacts).await?;

    // Stage 5: lifecycle hooks appropriate for how we got to Running.
    run_lifecycle(&engine, &outcome.record.container_id, &resolved, outcome.mode).await?;

    Ok(UpOutcome {
        compose_project_name: if resolved.uses_compose() {
            Some(
                outcome
                    .record
                    .compose_project
                    .unwrap_or_else(|| identity.compose_project_name()),
            )
        } else {
            None
        },
        container_id: outcome.record.container_id,
    })
}

fn engine_path(docker_path: &str) -> String {
    if docker_path.is_empty() {
        "docker".to_string()
    } else {
        docker_path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_container_env() {
        let env = parse_container_env(&[
            "MODE=ci".to_string(),
            "EMPTY=".to_string(),
        ])
        .unwrap();
        assert_eq!(env.get("MODE").unwrap(), "ci");
        assert_eq!(env.get("EMPTY").unwrap(), "");
    }

    #[test]
    fn test_parse_container_env_rejects_missing_equals() {
        let err = parse_container_env(&["JUSTANAME".to_string()]).unwrap_err();
        assert!(format!("{}", err).contains("JUSTANAME"));
    }

    #[test]
    fn test_success_serialization_shape() {
        let result = UpResult::from(UpOutcome {
            container_id: "abc123".to_string(),
            compose_project_name: None,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["containerId"], "abc123");
        assert!(json.get("composeProjectName").is_none());
    }

    #[test]
    fn test_success_serialization_with_compose_project() {
        let result = UpResult::from(UpOutcome {
            container_id: "abc123".to_string(),
            compose_project_name: Some("stevedore-cafe".to_string()),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["composeProjectName"], "stevedore-cafe");
    }

    #[test]
    fn test_from_error_names_missing_config() {
        let error: anyhow::Error = StevedoreError::Config(ConfigError::NotFound {
            path: "/work/app/.devcontainer/devcontainer.json".to_string(),
        })
        .into();

        let result = UpResult::from_error(error);
        match result {
            UpResult::Error(e) => {
                assert_eq!(e.outcome, "error");
                assert!(e.message.contains("not found at"));
                assert!(e.message.contains("/work/app"));
            }
            other => panic!("expected error result, got {:?}", other),
        }
    }

    #[test]
    fn test_workspace_root_error_for_missing_path() {
        let err = resolve_workspace_root(Path::new("/no/such/workspace")).unwrap_err();
        assert!(format!("{}", err).contains("not found at"));
    }
}
