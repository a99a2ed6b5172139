use crate::{FailoverError, FailoverResult};
use serde::{Deserialize, Serialize};
use warden_core::path::{join_path, validate_path};

/// Namespace under which project candidates are registered by default.
pub const DEFAULT_ROOT: &str = "/utils/autoswitch";

/// Configuration for a [`FailoverController`](crate::FailoverController)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Namespace holding one candidate node per project
    pub root: String,

    /// Project name; instances sharing it compete for one slot
    pub project: String,

    /// Label of this instance, used in logs and as the candidate payload
    pub instance_label: String,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            project: "default".to_string(),
            instance_label: "instance-0".to_string(),
        }
    }
}

impl FailoverConfig {
    pub fn new(project: impl Into<String>, instance_label: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            instance_label: instance_label.into(),
            ..Default::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Path of this project's candidate node.
    pub fn candidate_path(&self) -> String {
        join_path(&self.root, &self.project)
    }

    pub fn from_json(json: &str) -> FailoverResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FailoverResult<()> {
        validate_path(&self.root).map_err(|e| FailoverError::Config {
            reason: e.to_string(),
        })?;
        if matches!(self.project.as_str(), "" | "." | "..") || self.project.contains('/') {
            return Err(FailoverError::Config {
                reason: format!("project '{}' must be a single path segment", self.project),
            });
        }
        if self.instance_label.trim().is_empty() {
            return Err(FailoverError::Config {
                reason: "instance label cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
