//! Error types and handling
//!
//! Domain-specific error enums (configuration, engine, feature, lifecycle)
//! wrapped in the top-level `StevedoreError` for unified handling. Every
//! pipeline failure is one of these variants; the CLI maps them to the
//! structured JSON error outcome and nothing else crosses that boundary.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No declarative spec discoverable at or above the workspace root
    #[error("configuration not found at {path}")]
    NotFound { path: String },

    /// Configuration file parsing error
    #[error("failed to parse configuration file {path}: {message}")]
    Parsing { path: String, message: String },

    /// Configuration validation error
    #[error("configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
}

/// Container engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary is missing or its daemon cannot be reached
    #[error("container engine is not installed or not reachable: {message}")]
    Unavailable { message: String },

    /// An engine invocation (build/create/start/stop/remove/exec) failed.
    /// The engine's diagnostic text is carried verbatim, no retry.
    #[error("container engine {operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },

    /// Container not found
    #[error("container not found: {id}")]
    ContainerNotFound { id: String },
}

/// Feature metadata errors
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Feature metadata file not found
    #[error("feature metadata not found: {path}")]
    NotFound { path: String },

    /// Feature metadata parsing error
    #[error("failed to parse feature metadata {path}: {message}")]
    Parsing { path: String, message: String },

    /// Feature metadata validation error
    #[error("feature validation error: {message}")]
    Validation { message: String },
}

/// Lifecycle command execution errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A post-provision hook or feature install step exited non-zero.
    /// The container is left in its current, partially provisioned state.
    #[error("{phase} command failed with exit code {exit_code}: {detail}")]
    CommandFailed {
        phase: String,
        exit_code: i32,
        detail: String,
    },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum StevedoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Internal/generic errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with StevedoreError
pub type Result<T> = std::result::Result<T, StevedoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_display_names_path() {
        let error = ConfigError::NotFound {
            path: "/work/project/.devcontainer/devcontainer.json".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "configuration not found at /work/project/.devcontainer/devcontainer.json"
        );
    }

    #[test]
    fn test_engine_command_failed_carries_stderr_verbatim() {
        let error = EngineError::CommandFailed {
            operation: "build".to_string(),
            stderr: "failed to solve: alpine:does-not-exist".to_string(),
        };
        let rendered = format!("{}", error);
        assert!(rendered.contains("failed to solve: alpine:does-not-exist"));
        assert!(rendered.contains("build"));
    }

    #[test]
    fn test_lifecycle_failure_names_phase() {
        let error = LifecycleError::CommandFailed {
            phase: "postCreate".to_string(),
            exit_code: 7,
            detail: "npm install failed".to_string(),
        };
        let rendered = format!("{}", error);
        assert!(rendered.starts_with("postCreate command failed with exit code 7"));
    }

    #[test]
    fn test_wrapping_into_stevedore_error() {
        let config_error = ConfigError::NotFound {
            path: "/nowhere".to_string(),
        };
        let wrapped: StevedoreError = config_error.into();
        assert!(matches!(wrapped, StevedoreError::Config(_)));

        let engine_error = EngineError::Unavailable {
            message: "docker info exited 1".to_string(),
        };
        let wrapped: StevedoreError = engine_error.into();
        assert!(matches!(wrapped, StevedoreError::Engine(_)));
    }

    #[test]
    fn test_anyhow_conversion_preserves_message() {
        let error = StevedoreError::Engine(EngineError::Unavailable {
            message: "no socket".to_string(),
        });
        let anyhow_error = anyhow::Error::from(error);
        assert!(anyhow_error.to_string().contains("not reachable"));
    }
}
