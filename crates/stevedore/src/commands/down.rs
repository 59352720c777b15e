//! Down command implementation
//!
//! Teardown is the inverse path: identity lookup then engine stop/remove.
//! Configuration is not re-resolved and no override artifacts are touched;
//! containers are addressed by the workspace-hash label alone. Invoking
//! down against a workspace with no containers is a no-op success.

use anyhow::Result;
use std::path::PathBuf;
use stevedore_core::engine::CliEngine;
use stevedore_core::provision;
use stevedore_core::workspace::resolve_workspace_root;
use tracing::{debug, info, instrument};

/// Down command arguments
#[derive(Debug, Clone, Default)]
pub struct DownArgs {
    pub workspace_folder: Option<PathBuf>,
    pub docker_path: String,
}

/// Execute the down command.
#[instrument(skip(args))]
pub async fn execute_down(args: DownArgs) -> Result<()> {
    debug!("Down args: {:?}", args);

    let workspace_input = args
        .workspace_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace_root = resolve_workspace_root(&workspace_input)?;

    let docker_path = if args.docker_path.is_empty() {
        "docker".to_string()
    } else {
        args.docker_path.clone()
    };
    let engine = CliEngine::new(docker_path);

    let removed = provision::down(&engine, &workspace_root).await?;
    if removed == 0 {
        info!(
            "No containers to tear down for {}",
            workspace_root.display()
        );
    }
    Ok(())
}
