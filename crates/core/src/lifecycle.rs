//! Lifecycle command execution
//!
//! Runs post-provision hooks and feature install steps inside the running
//! container, sequentially and in declared order. A later feature's install
//! step does not start until the prior one exits. A non-zero exit from any
//! step is terminal; partial application is not rolled back.

use crate::config::ResolvedConfig;
use crate::engine::ContainerEngine;
use crate::errors::{LifecycleError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// A lifecycle command as declared in configuration: either a shell string
/// (run via `sh -c`) or an argv array (run directly).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandSpec {
    /// Render the command as the argv to hand the engine's exec.
    pub fn to_exec_argv(&self) -> Vec<String> {
        match self {
            CommandSpec::Shell(command) => {
                vec!["sh".to_string(), "-c".to_string(), command.clone()]
            }
            CommandSpec::Exec(argv) => argv.clone(),
        }
    }

    /// Human-readable rendering for logs.
    pub fn display(&self) -> String {
        match self {
            CommandSpec::Shell(command) => command.clone(),
            CommandSpec::Exec(argv) => shell_words::join(argv),
        }
    }

    /// Apply a substitution function to every string in the command.
    pub fn map_strings(&self, f: impl Fn(&str) -> String) -> CommandSpec {
        match self {
            CommandSpec::Shell(command) => CommandSpec::Shell(f(command)),
            CommandSpec::Exec(argv) => {
                CommandSpec::Exec(argv.iter().map(|a| f(a)).collect())
            }
        }
    }
}

/// How the container was provisioned, which decides the hook set to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Fresh build+start: full hook sequence
    Created,
    /// Existing stopped container restarted: runtime hooks only
    ReuseStarted,
    /// Already running: all hooks skipped
    Reused,
}

/// Execute the lifecycle hook sequence appropriate for `mode` inside the
/// container.
///
/// Fresh provision order: feature install steps (declaration order), then
/// onCreate, feature postCreate steps, the spec's postCreate, the dotfiles
/// step when a repository was supplied, and finally postStart. A restarted
/// container reruns postStart only; a reused running container runs
/// nothing.
#[instrument(skip(engine, resolved))]
pub async fn run_lifecycle<E: ContainerEngine>(
    engine: &E,
    container_id: &str,
    resolved: &ResolvedConfig,
    mode: ProvisionMode,
) -> Result<()> {
    match mode {
        ProvisionMode::Reused => {
            debug!("Container already running; skipping lifecycle hooks");
            return Ok(());
        }
        ProvisionMode::ReuseStarted => {
            debug!("Reuse-start: running postStart only");
            if let Some(command) = &resolved.spec.post_start_command {
                run_step(engine, container_id, "postStart", command, &IndexMap::new()).await?;
            }
            return Ok(());
        }
        ProvisionMode::Created => {}
    }

    for feature in &resolved.features {
        if let Some(command) = &feature.metadata.install_command {
            let phase = format!("feature install ({})", feature.id());
            run_step(engine, container_id, &phase, command, &feature.option_env()).await?;
        }
    }

    if let Some(command) = &resolved.spec.on_create_command {
        run_step(engine, container_id, "onCreate", command, &IndexMap::new()).await?;
    }

    for feature in &resolved.features {
        if let Some(command) = &feature.metadata.post_create_command {
            let phase = format!("feature postCreate ({})", feature.id());
            run_step(engine, container_id, &phase, command, &IndexMap::new()).await?;
        }
    }

    if let Some(command) = &resolved.spec.post_create_command {
        run_step(engine, container_id, "postCreate", command, &IndexMap::new()).await?;
    }

    if let Some(repository) = &resolved.dotfiles_repository {
        let command = dotfiles_command(repository);
        run_step(engine, container_id, "dotfiles", &command, &IndexMap::new()).await?;
    }

    if let Some(command) = &resolved.spec.post_start_command {
        run_step(engine, container_id, "postStart", command, &IndexMap::new()).await?;
    }

    Ok(())
}

/// Run a single lifecycle step and map a non-zero exit to a phase-tagged
/// failure.
async fn run_step<E: ContainerEngine>(
    engine: &E,
    container_id: &str,
    phase: &str,
    command: &CommandSpec,
    extra_env: &IndexMap<String, String>,
) -> Result<()> {
    info!("Running {} command: {}", phase, command.display());

    let output = engine
        .exec(container_id, &command.to_exec_argv(), extra_env)
        .await?;

    if output.exit_code != 0 {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };
        return Err(LifecycleError::CommandFailed {
            phase: phase.to_string(),
            exit_code: output.exit_code,
            detail,
        }
        .into());
    }

    debug!("{} command completed", phase);
    Ok(())
}

/// The dotfiles provisioning step: clone the repository and run its install
/// script when one exists. The script itself is an external collaborator;
/// the orchestrator only sequences it.
fn dotfiles_command(repository: &str) -> CommandSpec {
    CommandSpec::Shell(format!(
        "git clone --depth 1 {} /tmp/dotfiles && cd /tmp/dotfiles && \
         if [ -f install.sh ]; then sh install.sh; fi",
        repository
    ))
}
