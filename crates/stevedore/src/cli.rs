//! CLI surface and dispatch
//!
//! Parses arguments, initializes logging, and dispatches to the command
//! implementations. This is where the stdout JSON contract is enforced:
//! exactly one structured document per `up` invocation, logs on stderr,
//! exit code 0 on success and 1 on failure.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

use crate::commands::down::{execute_down, DownArgs};
use crate::commands::up::{execute_up, UpArgs, UpResult};

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

/// Development container lifecycle orchestrator
#[derive(Debug, Parser)]
#[command(name = "stevedore", version, about)]
pub struct Cli {
    /// Log output format (defaults to STEVEDORE_LOG_FORMAT or text)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Path to the container engine binary
    #[arg(long, global = true, default_value = "docker")]
    pub docker_path: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create and run the development container for a workspace
    Up {
        /// Workspace folder path (defaults to the current directory)
        #[arg(long)]
        workspace_folder: Option<PathBuf>,

        /// Configuration file path (skips discovery)
        #[arg(long)]
        config: Option<PathBuf>,

        /// User-data folder for persisted override artifacts
        #[arg(long)]
        user_data_folder: Option<PathBuf>,

        /// Dotfiles repository URL, provisioned after creation
        #[arg(long)]
        dotfiles_repository: Option<String>,

        /// Environment variable override (format: NAME=value, can be
        /// repeated); applied as the last merge layer
        #[arg(long)]
        container_env: Vec<String>,
    },

    /// Stop and remove the development container for a workspace
    Down {
        /// Workspace folder path (defaults to the current directory)
        #[arg(long)]
        workspace_folder: Option<PathBuf>,

        /// Configuration file path (accepted for symmetry; teardown
        /// addresses containers by workspace identity)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Dispatch to the selected command and return the process exit code.
    pub async fn dispatch(self) -> i32 {
        if let Err(e) =
            stevedore_core::logging::init(self.log_format.map(LogFormat::as_str))
        {
            eprintln!("Failed to initialize logging: {}", e);
        }

        match self.command {
            Commands::Up {
                workspace_folder,
                config,
                user_data_folder,
                dotfiles_repository,
                container_env,
            } => {
                let args = UpArgs {
                    workspace_folder,
                    config_path: config,
                    user_data_folder,
                    dotfiles_repository,
                    container_env,
                    docker_path: self.docker_path,
                };

                let result = match execute_up(args).await {
                    Ok(success) => UpResult::from(success),
                    Err(error) => {
                        debug!("Up failed: {:#}", error);
                        UpResult::from_error(error)
                    }
                };

                emit_result(&result)
            }
            Commands::Down {
                workspace_folder,
                config: _,
            } => {
                let args = DownArgs {
                    workspace_folder,
                    docker_path: self.docker_path,
                };

                match execute_down(args).await {
                    Ok(()) => 0,
                    Err(error) => {
                        debug!("Down failed: {:#}", error);
                        let result = UpResult::from_error(error);
                        emit_result(&result)
                    }
                }
            }
        }
    }
}

/// Emit exactly one JSON document on stdout and return the exit code.
fn emit_result(result: &UpResult) -> i32 {
    match serde_json::to_string_pretty(result) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            // Should be unreachable; keep the stdout contract anyway.
            println!(
                "{{\"outcome\": \"error\", \"message\": \"failed to serialize result: {}\"}}",
                e
            );
            return 1;
        }
    }
    match result {
        UpResult::Success(_) => 0,
        UpResult::Error(_) => 1,
    }
}
