//! Layered environment merge
//!
//! The effective container environment is computed as an explicit fold over
//! ordered mapping fragments: feature-declared defaults first, base-spec
//! values next, invocation-layer values last. Later layers win on scalar
//! collision; `append`/`prepend` policies compose with the value already
//! accumulated instead of replacing it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default separator for additive merges (PATH-style lists).
const DEFAULT_SEPARATOR: &str = ":";

/// Per-key merge policy for environment entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Replace whatever an earlier layer set (scalar keys)
    #[default]
    Override,
    /// Accumulated value, then separator, then this value
    Append,
    /// This value, then separator, then accumulated value
    Prepend,
}

/// A single environment entry: a value plus how it merges.
///
/// Deserializes from either a plain string (override policy) or an object
/// `{ "value": ..., "policy": ..., "separator": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EnvEntry {
    Plain(String),
    Detailed {
        value: String,
        #[serde(default)]
        policy: MergePolicy,
        #[serde(default)]
        separator: Option<String>,
    },
}

impl EnvEntry {
    pub fn value(&self) -> &str {
        match self {
            EnvEntry::Plain(v) => v,
            EnvEntry::Detailed { value, .. } => value,
        }
    }

    pub fn policy(&self) -> MergePolicy {
        match self {
            EnvEntry::Plain(_) => MergePolicy::Override,
            EnvEntry::Detailed { policy, .. } => *policy,
        }
    }

    fn separator(&self) -> &str {
        match self {
            EnvEntry::Plain(_) => DEFAULT_SEPARATOR,
            EnvEntry::Detailed { separator, .. } => {
                separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
            }
        }
    }
}

impl From<String> for EnvEntry {
    fn from(value: String) -> Self {
        EnvEntry::Plain(value)
    }
}

/// One ordered fragment of the environment overlay, tagged with the layer
/// it came from for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct EnvFragment {
    pub layer: String,
    pub entries: IndexMap<String, EnvEntry>,
}

impl EnvFragment {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: impl Into<EnvEntry>) {
        self.entries.insert(name.into(), entry.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The full environment overlay: fragments in merge order.
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    fragments: Vec<EnvFragment>,
}

impl EnvOverlay {
    pub fn push(&mut self, fragment: EnvFragment) {
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(EnvFragment::is_empty)
    }

    /// Fold the fragments into the effective environment, later layers
    /// winning on collision unless the colliding entry is additive.
    pub fn merge(&self) -> IndexMap<String, String> {
        let mut merged: IndexMap<String, String> = IndexMap::new();

        for fragment in &self.fragments {
            for (name, entry) in &fragment.entries {
                let next = match (merged.get(name), entry.policy()) {
                    (Some(existing), MergePolicy::Append) => {
                        format!("{}{}{}", existing, entry.separator(), entry.value())
                    }
                    (Some(existing), MergePolicy::Prepend) => {
                        format!("{}{}{}", entry.value(), entry.separator(), existing)
                    }
                    _ => entry.value().to_string(),
                };
                debug!(
                    layer = %fragment.layer,
                    name = %name,
                    "Merged environment entry"
                );
                merged.insert(name.clone(), next);
            }
        }

        merged
    }
}
