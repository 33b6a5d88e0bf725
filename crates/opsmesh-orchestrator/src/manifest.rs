use crate::types::TaskSpec;
use opsmesh_core::{OpsmeshError, OpsmeshResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An explicit task list read from a TOML or JSON file.
///
/// ```toml
/// title = "Web rollout"
///
/// [[tasks]]
/// id = "infra"
/// agent_type = "infrastructure"
/// description = "Launch an ec2 instance"
///
/// [[tasks]]
/// id = "deploy"
/// agent_type = "deployment"
/// description = "Deploy the api"
/// depends_on = ["infra"]
/// parameters = { application = "api", version = "1.4.0" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanManifest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl PlanManifest {
    pub fn from_toml_str(raw: &str) -> OpsmeshResult<Self> {
        toml::from_str(raw).map_err(|e| OpsmeshError::Config(format!("Invalid task file: {e}")))
    }

    pub fn from_json_str(raw: &str) -> OpsmeshResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a manifest, picking the format from the file extension
    /// (`.json` is JSON, anything else is TOML).
    pub fn from_path(path: impl AsRef<Path>) -> OpsmeshResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_toml_str(&raw)
        }
    }

    /// The manifest title, or a default derived from the task count.
    pub fn title_or_default(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Task plan ({} tasks)", self.tasks.len()))
    }
}
