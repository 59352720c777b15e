//! Container identity derivation
//!
//! A stable identity for (workspace, resolved configuration): the sole
//! authority for reuse decisions. The config hash is computed over a
//! canonicalized (key-sorted) JSON rendering of the resolved spec content,
//! never over file paths or raw bytes, so whitespace and key-order
//! differences in the source do not change identity while any semantic
//! change does. Two workspaces with byte-identical configs are still
//! distinguished by the workspace hash.

use crate::config::ResolvedConfig;
use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, instrument};

/// Container label schema for identity tagging
pub const LABEL_SOURCE: &str = "stevedore.source";
pub const LABEL_WORKSPACE_HASH: &str = "stevedore.workspaceHash";
pub const LABEL_CONFIG_HASH: &str = "stevedore.configHash";

/// Source identifier for containers created by this orchestrator
pub const STEVEDORE_SOURCE: &str = "stevedore";

/// Hash length kept in labels and names
const HASH_LEN: usize = 12;

/// Identity of a (workspace, configuration) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// Hash of the canonical workspace path
    pub workspace_hash: String,
    /// Hash of the normalized configuration content
    pub config_hash: String,
    /// Human-readable name from the spec, if any
    pub name: Option<String>,
}

impl ContainerIdentity {
    /// Derive the identity for a resolved configuration.
    #[instrument(skip(resolved))]
    pub fn new(resolved: &ResolvedConfig) -> Self {
        let workspace_hash = hash_workspace_path(&resolved.workspace_root);
        let config_hash = hash_config(resolved);

        debug!(
            workspace_hash = %workspace_hash,
            config_hash = %config_hash,
            "Derived container identity"
        );

        Self {
            workspace_hash,
            config_hash,
            name: resolved.spec.name.clone(),
        }
    }

    /// Combined identity string embedded in artifact names and engine
    /// resource names
    pub fn id(&self) -> String {
        format!("{}{}", self.workspace_hash, self.config_hash)
    }

    /// Deterministic container name for the single-container flow
    pub fn container_name(&self) -> String {
        format!("stevedore-{}", self.id())
    }

    /// Deterministic compose project name
    pub fn compose_project_name(&self) -> String {
        format!("stevedore-{}", self.id())
    }

    /// Labels attached to every engine resource carrying this identity
    pub fn labels(&self) -> IndexMap<String, String> {
        let mut labels = IndexMap::new();
        labels.insert(LABEL_SOURCE.to_string(), STEVEDORE_SOURCE.to_string());
        labels.insert(
            LABEL_WORKSPACE_HASH.to_string(),
            self.workspace_hash.clone(),
        );
        labels.insert(LABEL_CONFIG_HASH.to_string(), self.config_hash.clone());
        labels
    }

    /// `key=value` filters selecting exactly this identity
    pub fn label_selector(&self) -> Vec<String> {
        vec![
            format!("{}={}", LABEL_SOURCE, STEVEDORE_SOURCE),
            format!("{}={}", LABEL_WORKSPACE_HASH, self.workspace_hash),
            format!("{}={}", LABEL_CONFIG_HASH, self.config_hash),
        ]
    }
}

/// `key=value` filters selecting every identity under a workspace;
/// teardown addresses containers this way without resolving config.
pub fn workspace_selector(workspace_root: &Path) -> Vec<String> {
    vec![
        format!("{}={}", LABEL_SOURCE, STEVEDORE_SOURCE),
        format!(
            "{}={}",
            LABEL_WORKSPACE_HASH,
            hash_workspace_path(workspace_root)
        ),
    ]
}

/// Hash the canonical workspace path.
pub fn hash_workspace_path(workspace_root: &Path) -> String {
    let canonical = workspace_root
        .canonicalize()
        .unwrap_or_else(|_| workspace_root.to_path_buf());
    short_hash(canonical.display().to_string().as_bytes())
}

/// Hash the normalized configuration content: the spec, the resolved
/// feature layers (metadata + options), and the folded environment.
fn hash_config(resolved: &ResolvedConfig) -> String {
    let features: Vec<Value> = resolved
        .features
        .iter()
        .map(|f| {
            serde_json::json!({
                "id": f.id(),
                "metadata": &f.metadata,
                "options": &f.options,
            })
        })
        .collect();

    let mut document = serde_json::json!({
        "spec": &resolved.spec,
        "features": features,
        "env": resolved.merged_env(),
        "dotfiles": &resolved.dotfiles_repository,
    });
    canonicalize_json(&mut document);

    let normalized = serde_json::to_string(&document).unwrap_or_default();
    short_hash(normalized.as_bytes())
}

fn short_hash(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    let hex = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    hex[..HASH_LEN].to_string()
}

/// Sort object keys recursively so serialization order never leaks into
/// the hash.
fn canonicalize_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .iter_mut()
                .map(|(k, v)| (k.clone(), std::mem::take(v)))
                .collect();
            map.clear();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, mut val) in entries {
                canonicalize_json(&mut val);
                map.insert(key, val);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize_json(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResolveOptions};
    use std::path::Path;
    use tempfile::TempDir;

    fn workspace_with_config(contents: &str) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join(".devcontainer");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("devcontainer.json"), contents).unwrap();
        temp_dir
    }

    fn identity_for(temp_dir: &TempDir) -> ContainerIdentity {
        let resolved = resolve(temp_dir.path(), ResolveOptions::default()).unwrap();
        ContainerIdentity::new(&resolved)
    }

    #[test]
    fn test_identity_is_deterministic() {
        let temp_dir = workspace_with_config(r#"{ "image": "ubuntu:24.04" }"#);
        let first = identity_for(&temp_dir);
        let second = identity_for(&temp_dir);
        assert_eq!(first, second);
        assert_eq!(first.container_name(), second.container_name());
    }

    #[test]
    fn test_whitespace_and_key_order_do_not_change_identity() {
        let compact = workspace_with_config(r#"{"image":"ubuntu:24.04","name":"dev"}"#);
        let airy = workspace_with_config(
            r#"{
                "name":  "dev",

                "image": "ubuntu:24.04"
            }"#,
        );

        let a = identity_for(&compact);
        let b = identity_for(&airy);
        assert_eq!(a.config_hash, b.config_hash);
        // Distinct workspaces still get distinct identities.
        assert_ne!(a.workspace_hash, b.workspace_hash);
    }

    #[test]
    fn test_semantic_change_changes_identity() {
        let temp_dir = workspace_with_config(r#"{ "image": "ubuntu:24.04" }"#);
        let before = identity_for(&temp_dir);

        std::fs::write(
            temp_dir
                .path()
                .join(".devcontainer")
                .join("devcontainer.json"),
            r#"{ "image": "ubuntu:25.04" }"#,
        )
        .unwrap();
        let after = identity_for(&temp_dir);

        assert_eq!(before.workspace_hash, after.workspace_hash);
        assert_ne!(before.config_hash, after.config_hash);
    }

    #[test]
    fn test_invocation_env_changes_identity() {
        let temp_dir = workspace_with_config(r#"{ "image": "ubuntu:24.04" }"#);
        let plain = identity_for(&temp_dir);

        let mut invocation_env = IndexMap::new();
        invocation_env.insert("MODE".to_string(), "ci".to_string());
        let resolved = resolve(
            temp_dir.path(),
            ResolveOptions {
                invocation_env,
                ..Default::default()
            },
        )
        .unwrap();
        let with_env = ContainerIdentity::new(&resolved);

        assert_ne!(plain.config_hash, with_env.config_hash);
    }

    #[test]
    fn test_labels_and_selector_agree() {
        let temp_dir = workspace_with_config(r#"{ "image": "ubuntu:24.04" }"#);
        let identity = identity_for(&temp_dir);

        let labels = identity.labels();
        assert_eq!(labels.get(LABEL_SOURCE).unwrap(), STEVEDORE_SOURCE);
        for filter in identity.label_selector() {
            let (key, value) = filter.split_once('=').unwrap();
            assert_eq!(labels.get(key).unwrap(), value);
        }
    }

    #[test]
    fn test_workspace_selector_matches_identity_workspace_hash() {
        let temp_dir = workspace_with_config(r#"{ "image": "ubuntu:24.04" }"#);
        let identity = identity_for(&temp_dir);

        let selector = workspace_selector(temp_dir.path());
        assert!(selector
            .iter()
            .any(|f| f == &format!("{}={}", LABEL_WORKSPACE_HASH, identity.workspace_hash)));
    }

    #[test]
    fn test_hash_length_and_charset() {
        let hash = hash_workspace_path(Path::new("/tmp"));
        assert_eq!(hash.len(), HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
