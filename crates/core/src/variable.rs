//! Variable substitution in configuration values
//!
//! Supports the substitution variables the orchestration pipeline needs:
//! `${localWorkspaceFolder}`, `${containerWorkspaceFolder}` and
//! `${localEnv:VAR}`. Unknown variables are left untouched so the engine
//! can surface them in its own diagnostics.

use std::path::Path;

/// Context for variable substitution over a resolved configuration.
#[derive(Debug, Clone)]
pub struct SubstitutionContext {
    /// Host-side workspace root
    pub local_workspace_folder: String,
    /// Workspace folder inside the container
    pub container_workspace_folder: String,
}

impl SubstitutionContext {
    pub fn new(workspace_root: &Path, container_workspace_folder: &str) -> Self {
        Self {
            local_workspace_folder: workspace_root.display().to_string(),
            container_workspace_folder: container_workspace_folder.to_string(),
        }
    }

    /// Substitute all supported variables in `input`.
    pub fn substitute(&self, input: &str) -> String {
        let mut output = input
            .replace("${localWorkspaceFolder}", &self.local_workspace_folder)
            .replace(
                "${containerWorkspaceFolder}",
                &self.container_workspace_folder,
            );

        // ${localEnv:VAR} resolves against the invoking process environment;
        // unset variables become the empty string.
        while let Some(start) = output.find("${localEnv:") {
            let Some(end_offset) = output[start..].find('}') else {
                break;
            };
            let end = start + end_offset;
            let var_name = &output[start + "${localEnv:".len()..end];
            let value = std::env::var(var_name).unwrap_or_default();
            output.replace_range(start..=end, &value);
        }

        output
    }
}
