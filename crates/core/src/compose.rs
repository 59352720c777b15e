//! Compose integration
//!
//! Drives multi-service configurations through `docker compose`. The
//! command builder threads the base compose files, any override artifacts,
//! and the identity-derived project name into each invocation; the compose
//! dialect itself is the engine's concern.

use crate::errors::{EngineError, Result};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Compose command builder bound to one project
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    engine_path: String,
    base_path: PathBuf,
    compose_files: Vec<PathBuf>,
    project_name: String,
}

impl ComposeCommand {
    pub fn new(
        base_path: PathBuf,
        compose_files: Vec<PathBuf>,
        project_name: String,
    ) -> Self {
        Self {
            engine_path: "docker".to_string(),
            base_path,
            compose_files,
            project_name,
        }
    }

    /// Use a custom engine binary path
    pub fn with_engine_path(mut self, engine_path: impl Into<String>) -> Self {
        self.engine_path = engine_path.into();
        self
    }

    /// Append override artifact files after the base compose files so
    /// their values win per compose merge semantics.
    pub fn with_override_files(mut self, overrides: &[PathBuf]) -> Self {
        self.compose_files.extend(overrides.iter().cloned());
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    fn build_args(&self, tail: &[&str]) -> Vec<String> {
        let mut args = vec!["compose".to_string()];
        for file in &self.compose_files {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        args.push("-p".to_string());
        args.push(self.project_name.clone());
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }

    async fn execute(&self, operation: &str, tail: &[&str]) -> Result<String> {
        let args = self.build_args(tail);
        debug!("Running {} {}", self.engine_path, args.join(" "));

        let output = Command::new(&self.engine_path)
            .args(&args)
            .current_dir(&self.base_path)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to invoke {}: {}", self.engine_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::CommandFailed {
                operation: format!("compose {}", operation),
                stderr,
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Build and start services detached. Compose performs the image
    /// builds itself, honoring any build override artifact in the file
    /// list.
    #[instrument(skip(self))]
    pub async fn up(&self) -> Result<()> {
        self.execute("up", &["up", "-d"]).await?;
        Ok(())
    }

    /// Start an already-built project without rebuilding; start-time
    /// overrides in the file list are applied, images are not touched.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        self.execute("up", &["up", "-d", "--no-build"]).await?;
        Ok(())
    }

    /// Stop and remove the project's containers and networks.
    #[instrument(skip(self))]
    pub async fn down(&self) -> Result<()> {
        self.execute("down", &["down"]).await?;
        Ok(())
    }
}

/// Tear down a compose project addressed by name alone. Used by teardown,
/// which has only engine-observed state to go on (no resolved config, so
/// no compose file list).
#[instrument]
pub async fn down_project(engine_path: &str, project_name: &str) -> Result<()> {
    debug!("Running {} compose -p {} down", engine_path, project_name);

    let output = Command::new(engine_path)
        .args(["compose", "-p", project_name, "down"])
        .output()
        .await
        .map_err(|e| EngineError::Unavailable {
            message: format!("failed to invoke {}: {}", engine_path, e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(EngineError::CommandFailed {
            operation: "compose down".to_string(),
            stderr,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_interleave_files_and_project() {
        let command = ComposeCommand::new(
            PathBuf::from("/work/app"),
            vec![PathBuf::from("docker-compose.yml")],
            "stevedore-cafe".to_string(),
        )
        .with_override_files(&[PathBuf::from(
            "/data/engine-overrides/docker-compose.build-cafe.yml",
        )]);

        let args = command.build_args(&["up", "-d"]);
        assert_eq!(
            args,
            vec![
                "compose",
                "-f",
                "docker-compose.yml",
                "-f",
                "/data/engine-overrides/docker-compose.build-cafe.yml",
                "-p",
                "stevedore-cafe",
                "up",
                "-d",
            ]
        );
    }

    #[test]
    fn test_override_files_follow_base_files() {
        let command = ComposeCommand::new(
            PathBuf::from("."),
            vec![
                PathBuf::from("a.yml"),
                PathBuf::from("b.yml"),
            ],
            "p".to_string(),
        )
        .with_override_files(&[PathBuf::from("override.yml")]);

        let args = command.build_args(&[]);
        let file_positions: Vec<&String> = args
            .iter()
            .filter(|a| a.ends_with(".yml"))
            .collect();
        assert_eq!(file_positions, ["a.yml", "b.yml", "override.yml"]);
    }
}
