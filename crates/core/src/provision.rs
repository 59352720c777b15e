//! Container provisioning
//!
//! The per-identity state machine: `Absent -> Building -> Starting ->
//! Running`, `Stopped -> Starting -> Running` (no rebuild), `Running ->
//! Running` (no-op). The reuse decision reads only the engine's answer to
//! the identity label query — never the presence of override artifacts.
//! Invocations sharing an identity serialize on an identity-scoped lock
//! held for the duration of the state transitions; distinct identities
//! proceed independently.

use crate::compose::{self, ComposeCommand};
use crate::config::ResolvedConfig;
use crate::engine::{ContainerEngine, CreateSpec, EngineContainer};
use crate::errors::{ConfigError, EngineError, Result};
use crate::identity::{self, ContainerIdentity};
use crate::lifecycle::ProvisionMode;
use crate::overrides::OverrideArtifactSet;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

/// Engine-observed record for a matched container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRecord {
    /// Engine-assigned container ID
    pub container_id: String,
    /// Container name
    pub name: String,
    /// Compose project, when compose-managed
    pub compose_project: Option<String>,
}

impl ContainerRecord {
    fn from_container(container: &EngineContainer) -> Self {
        Self {
            container_id: container.id.clone(),
            name: container.name.clone(),
            compose_project: container.compose_project().map(str::to_string),
        }
    }
}

/// Result of the identity match against engine state
#[derive(Debug, Clone, PartialEq)]
pub enum MatchState {
    Absent,
    Stopped(ContainerRecord),
    Running(ContainerRecord),
}

/// Outcome of a provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub record: ContainerRecord,
    pub mode: ProvisionMode,
}

/// Per-identity locks serializing concurrent provisioning of the same
/// identity within this process.
static IDENTITY_LOCKS: Lazy<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
    Lazy::new(|| StdMutex::new(HashMap::new()));

fn lock_for(identity_id: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = IDENTITY_LOCKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks
        .entry(identity_id.to_string())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Pick the match from the engine's answer: a running container wins,
/// otherwise the first stopped one.
fn select_match(containers: &[EngineContainer]) -> MatchState {
    if let Some(running) = containers.iter().find(|c| c.is_running()) {
        return MatchState::Running(ContainerRecord::from_container(running));
    }
    if let Some(stopped) = containers.first() {
        return MatchState::Stopped(ContainerRecord::from_container(stopped));
    }
    MatchState::Absent
}

/// Query the engine for a container or compose project carrying this
/// identity. No side effects.
#[instrument(skip(engine, identity))]
pub async fn match_identity<E: ContainerEngine>(
    engine: &E,
    identity: &ContainerIdentity,
) -> Result<MatchState> {
    let containers = engine.list_by_labels(&identity.label_selector()).await?;
    let state = select_match(&containers);
    debug!("Identity match: {:?}", state);
    Ok(state)
}

/// Bring the identity to `Running`, reusing an existing container when the
/// match allows it.
#[instrument(skip(engine, resolved, identity, artifacts))]
pub async fn up<E: ContainerEngine>(
    engine: &E,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
    artifacts: &OverrideArtifactSet,
) -> Result<ProvisionOutcome> {
    engine.ping().await?;

    let lock = lock_for(&identity.id());
    let _guard = lock.lock().await;

    match match_identity(engine, identity).await? {
        MatchState::Running(record) => {
            info!(
                "Container {} already running; nothing to do",
                record.container_id
            );
            Ok(ProvisionOutcome {
                record,
                mode: ProvisionMode::Reused,
            })
        }
        MatchState::Stopped(record) => {
            info!(
                "Reusing stopped container {}; starting without rebuild",
                record.container_id
            );
            start_existing(engine, resolved, identity, artifacts, &record).await?;
            Ok(ProvisionOutcome {
                record,
                mode: ProvisionMode::ReuseStarted,
            })
        }
        MatchState::Absent => {
            info!("No matching container; building and starting");
            let record = create_and_start(engine, resolved, identity, artifacts).await?;
            Ok(ProvisionOutcome {
                record,
                mode: ProvisionMode::Created,
            })
        }
    }
}

/// `Stopped -> Starting -> Running`: no build; start-time overrides only.
async fn start_existing<E: ContainerEngine>(
    engine: &E,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
    artifacts: &OverrideArtifactSet,
    record: &ContainerRecord,
) -> Result<()> {
    if resolved.uses_compose() {
        compose_command(engine, resolved, identity, artifacts)
            .start()
            .await
    } else {
        engine.start_container(&record.container_id).await
    }
}

/// `Absent -> Building -> Starting -> Running`.
async fn create_and_start<E: ContainerEngine>(
    engine: &E,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
    artifacts: &OverrideArtifactSet,
) -> Result<ContainerRecord> {
    if resolved.uses_compose() {
        compose_command(engine, resolved, identity, artifacts)
            .up()
            .await?;

        // The injection override tags the primary service with the
        // identity labels; the engine is the source of truth for the id.
        return match match_identity(engine, identity).await? {
            MatchState::Running(record) | MatchState::Stopped(record) => Ok(record),
            MatchState::Absent => Err(EngineError::ContainerNotFound {
                id: identity.compose_project_name(),
            }
            .into()),
        };
    }

    let image = match &resolved.spec.image {
        Some(image) => image.clone(),
        None => build_image(engine, resolved, identity).await?,
    };

    let spec = CreateSpec {
        name: identity.container_name(),
        image,
        labels: identity.labels(),
        env: resolved.merged_env(),
        workspace_mount: Some((
            resolved.workspace_root.clone(),
            resolved.container_workspace_folder(),
        )),
        command: vec!["sleep".to_string(), "infinity".to_string()],
    };

    let container_id = engine.create_container(&spec).await?;
    engine.start_container(&container_id).await?;

    Ok(ContainerRecord {
        container_id,
        name: spec.name,
        compose_project: None,
    })
}

/// Build the image for a Dockerfile-based config, tagged by identity.
async fn build_image<E: ContainerEngine>(
    engine: &E,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
) -> Result<String> {
    let config_dir = resolved.config_dir();
    let dockerfile_rel = resolved
        .spec
        .dockerfile
        .clone()
        .or_else(|| {
            resolved
                .spec
                .build
                .as_ref()
                .and_then(|b| b.dockerfile.clone())
        })
        .ok_or_else(|| ConfigError::Validation {
            message: format!(
                "{} has neither image nor dockerfile",
                resolved.config_path.display()
            ),
        })?;
    let dockerfile = config_dir.join(dockerfile_rel);
    let context: PathBuf = resolved
        .spec
        .build
        .as_ref()
        .and_then(|b| b.context.as_ref())
        .map(|c| config_dir.join(c))
        .unwrap_or_else(|| {
            dockerfile
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config_dir.clone())
        });
    let build_args = resolved
        .spec
        .build
        .as_ref()
        .map(|b| b.args.clone())
        .unwrap_or_default();

    let tag = format!("stevedore-{}", identity.id());
    engine
        .build_image(&context, &dockerfile, &tag, &build_args, &identity.labels())
        .await?;
    Ok(tag)
}

fn compose_command<E: ContainerEngine>(
    engine: &E,
    resolved: &ResolvedConfig,
    identity: &ContainerIdentity,
    artifacts: &OverrideArtifactSet,
) -> ComposeCommand {
    ComposeCommand::new(
        resolved.config_dir(),
        resolved.compose_files(),
        identity.compose_project_name(),
    )
    .with_engine_path(engine.engine_name())
    .with_override_files(&artifacts.paths())
}

/// Tear down every container under a workspace: `Running|Stopped ->
/// Absent` by stopping and removing. Idempotent — an absent identity is a
/// no-op success. Addresses containers by the workspace-hash label alone,
/// so no configuration resolution is involved.
#[instrument(skip(engine))]
pub async fn down<E: ContainerEngine>(engine: &E, workspace_root: &Path) -> Result<usize> {
    engine.ping().await?;

    let selector = identity::workspace_selector(workspace_root);
    let containers = engine.list_by_labels(&selector).await?;

    if containers.is_empty() {
        info!("No containers found for workspace; nothing to tear down");
        return Ok(0);
    }

    let mut removed = 0;
    let mut projects_done: Vec<String> = Vec::new();

    for container in &containers {
        if let Some(project) = container.compose_project() {
            if projects_done.iter().any(|p| p == project) {
                continue;
            }
            debug!("Tearing down compose project {}", project);
            compose::down_project(engine.engine_name(), project).await?;
            projects_done.push(project.to_string());
            removed += 1;
        } else {
            debug!("Removing container {}", container.id);
            if container.is_running() {
                engine.stop_container(&container.id).await?;
            }
            engine.remove_container(&container.id).await?;
            removed += 1;
        }
    }

    info!("Tore down {} container(s)/project(s)", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, state: &str, labels: &[(&str, &str)]) -> EngineContainer {
        EngineContainer {
            id: id.to_string(),
            name: format!("name-{}", id),
            state: state.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_select_match_empty_is_absent() {
        assert_eq!(select_match(&[]), MatchState::Absent);
    }

    #[test]
    fn test_select_match_prefers_running() {
        let containers = vec![
            container("stopped1", "exited", &[]),
            container("running1", "running", &[]),
        ];
        match select_match(&containers) {
            MatchState::Running(record) => assert_eq!(record.container_id, "running1"),
            other => panic!("expected Running, got {:?}", other),
        }
    }

    #[test]
    fn test_select_match_stopped_when_nothing_running() {
        let containers = vec![container("stopped1", "exited", &[])];
        match select_match(&containers) {
            MatchState::Stopped(record) => {
                assert_eq!(record.container_id, "stopped1");
                assert!(record.compose_project.is_none());
            }
            other => panic!("expected Stopped, got {:?}", other),
        }
    }

    #[test]
    fn test_record_carries_compose_project() {
        let containers = vec![container(
            "c1",
            "running",
            &[("com.docker.compose.project", "stevedore-abc")],
        )];
        match select_match(&containers) {
            MatchState::Running(record) => {
                assert_eq!(record.compose_project.as_deref(), Some("stevedore-abc"));
            }
            other => panic!("expected Running, got {:?}", other),
        }
    }

    #[test]
    fn test_identity_locks_are_scoped() {
        let a1 = lock_for("identity-a");
        let a2 = lock_for("identity-a");
        let b = lock_for("identity-b");

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn test_same_identity_lock_serializes() {
        tokio_test::block_on(async {
            let lock = lock_for("identity-serial");
            let guard = lock.lock().await;
            assert!(lock_for("identity-serial").try_lock().is_err());
            drop(guard);
            assert!(lock_for("identity-serial").try_lock().is_ok());
        });
    }
}
