//! Container engine integration
//!
//! Abstraction over the container engine CLI. Each operation is a single
//! synchronous request/response subprocess invocation; the engine's own
//! build/run semantics are invoked, never reimplemented. Engine stderr is
//! carried verbatim into `EngineError::CommandFailed` so provisioning
//! failures surface the engine's diagnostic text unchanged.

use crate::errors::{EngineError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Compose project label the engine attaches to compose-managed containers
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Engine-observed container state for a single container
#[derive(Debug, Clone, PartialEq)]
pub struct EngineContainer {
    /// Engine-assigned container ID
    pub id: String,
    /// Container name
    pub name: String,
    /// Engine state string ("running", "exited", "created", ...)
    pub state: String,
    /// Container labels
    pub labels: HashMap<String, String>,
}

impl EngineContainer {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Compose project this container belongs to, when compose-managed.
    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(COMPOSE_PROJECT_LABEL).map(String::as_str)
    }
}

/// Output of an exec invocation inside a container
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Specification for creating a single container
#[derive(Debug, Clone)]
pub struct CreateSpec {
    /// Deterministic container name
    pub name: String,
    /// Image reference (configured image or locally built tag)
    pub image: String,
    /// Identity labels to attach
    pub labels: IndexMap<String, String>,
    /// Merged environment to bake into the container
    pub env: IndexMap<String, String>,
    /// Host workspace path bind-mounted into the container
    pub workspace_mount: Option<(PathBuf, String)>,
    /// Command keeping the container alive
    pub command: Vec<String>,
}

/// Container engine operations used by the provisioning pipeline
#[allow(async_fn_in_trait)]
pub trait ContainerEngine {
    /// Engine binary name for diagnostics
    fn engine_name(&self) -> &str;

    /// Probe engine availability (daemon reachable)
    async fn ping(&self) -> Result<()>;

    /// List all containers (any state) matching every `key=value` label
    async fn list_by_labels(&self, labels: &[String]) -> Result<Vec<EngineContainer>>;

    /// Build an image from a Dockerfile, returning nothing; the tag is
    /// caller-chosen and deterministic
    async fn build_image(
        &self,
        context: &PathBuf,
        dockerfile: &PathBuf,
        tag: &str,
        build_args: &IndexMap<String, String>,
        labels: &IndexMap<String, String>,
    ) -> Result<()>;

    /// Create a container, returning the engine-assigned ID
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    /// Start a container by ID
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container by ID
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Remove a container by ID
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Execute a command inside a running container
    async fn exec(
        &self,
        id: &str,
        argv: &[String],
        env: &IndexMap<String, String>,
    ) -> Result<ExecOutput>;
}

/// CLI-backed engine implementation (docker or a compatible binary)
#[derive(Debug, Clone)]
pub struct CliEngine {
    engine_path: String,
}

impl Default for CliEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl CliEngine {
    pub fn new(engine_path: impl Into<String>) -> Self {
        Self {
            engine_path: engine_path.into(),
        }
    }

    pub fn engine_path(&self) -> &str {
        &self.engine_path
    }

    /// Run the engine binary with `args`, mapping a spawn failure to
    /// `Unavailable` and a non-zero exit to `CommandFailed` for the named
    /// operation.
    async fn run(&self, operation: &str, args: &[String]) -> Result<std::process::Output> {
        debug!("Running {} {}", self.engine_path, args.join(" "));

        let output = Command::new(&self.engine_path)
            .args(args)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to invoke {}: {}", self.engine_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::CommandFailed {
                operation: operation.to_string(),
                stderr,
            }
            .into());
        }

        Ok(output)
    }
}

impl ContainerEngine for CliEngine {
    fn engine_name(&self) -> &str {
        &self.engine_path
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let output = Command::new(&self.engine_path)
            .arg("info")
            .output()
            .await
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to invoke {}: {}", self.engine_path, e),
            })?;

        if !output.status.success() {
            return Err(EngineError::Unavailable {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_labels(&self, labels: &[String]) -> Result<Vec<EngineContainer>> {
        // --no-trunc keeps IDs full-length so a reused container reports
        // the same identifier `create` originally returned.
        let mut args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--no-trunc".to_string(),
        ];
        for label in labels {
            args.push("--filter".to_string());
            args.push(format!("label={}", label));
        }
        args.push("--format".to_string());
        args.push("{{json .}}".to_string());

        let output = self.run("ps", &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut containers = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => {
                    if let Some(container) = parse_ps_line(&value) {
                        containers.push(container);
                    }
                }
                Err(e) => {
                    debug!("Skipping unparseable ps line: {}", e);
                }
            }
        }

        Ok(containers)
    }

    #[instrument(skip(self, build_args, labels))]
    async fn build_image(
        &self,
        context: &PathBuf,
        dockerfile: &PathBuf,
        tag: &str,
        build_args: &IndexMap<String, String>,
        labels: &IndexMap<String, String>,
    ) -> Result<()> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            "-t".to_string(),
            tag.to_string(),
        ];
        for (key, value) in build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(context.display().to_string());

        self.run("build", &args).await?;
        Ok(())
    }

    #[instrument(skip(self, spec))]
    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];
        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some((host, container)) = &spec.workspace_mount {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), container));
            args.push("-w".to_string());
            args.push(container.clone());
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        let output = self.run("create", &args).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(EngineError::CommandFailed {
                operation: "create".to_string(),
                stderr: "engine returned no container id".to_string(),
            }
            .into());
        }
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, id: &str) -> Result<()> {
        self.run("start", &["start".to_string(), id.to_string()])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, id: &str) -> Result<()> {
        self.run("stop", &["stop".to_string(), id.to_string()])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, id: &str) -> Result<()> {
        self.run("rm", &["rm".to_string(), "-f".to_string(), id.to_string()])
            .await?;
        Ok(())
    }

    #[instrument(skip(self, argv, env))]
    async fn exec(
        &self,
        id: &str,
        argv: &[String],
        env: &IndexMap<String, String>,
    ) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(id.to_string());
        args.extend(argv.iter().cloned());

        debug!("Running {} exec in {}", self.engine_path, id);
        let output = Command::new(&self.engine_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to invoke {}: {}", self.engine_path, e),
            })?;

        // Non-zero exit here belongs to the command run inside the
        // container, not the engine; the caller decides how to report it.
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Parse one `docker ps --format '{{json .}}'` line.
///
/// The CLI renders labels as a single `k=v,k=v` string.
fn parse_ps_line(value: &serde_json::Value) -> Option<EngineContainer> {
    let id = value.get("ID")?.as_str()?.to_string();
    let name = value
        .get("Names")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let state = value
        .get("State")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut labels = HashMap::new();
    if let Some(raw) = value.get("Labels").and_then(|v| v.as_str()) {
        for pair in raw.split(',').filter(|p| !p.is_empty()) {
            if let Some((key, val)) = pair.split_once('=') {
                labels.insert(key.to_string(), val.to_string());
            }
        }
    }

    Some(EngineContainer {
        id,
        name,
        state,
        labels,
    })
}
