//! State types for tracking deployment state.
//!
//! These types represent the recorded state of a deployment: what was last
//! applied for each resource and what the provider reported back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::resource::Outputs;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept per deployment.
pub const MAX_HISTORY: usize = 100;

/// Identifies one deployment: a project in one environment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
}

/// The complete recorded state of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Deployment this state belongs to.
    pub deployment: DeploymentId,
    /// Version stamp for optimistic concurrency; 0 means never saved.
    pub serial: u64,
    /// Hash of the last applied configuration.
    #[serde(default)]
    pub config_hash: String,
    /// Records keyed by logical resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, StateRecord>,
    /// Stack outputs resolved by the last apply.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Run history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Last-known state of a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Logical name.
    pub name: String,
    /// Provider type tag.
    pub resource_type: String,
    /// Last applied properties in canonical declared form.
    pub properties: BTreeMap<String, Value>,
    /// Last resolved inputs sent to the provider.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    /// Outputs reported by the provider.
    #[serde(default)]
    pub outputs: Outputs,
    /// Resources this one depended on when last applied.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// When the resource was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Run identifier.
    pub run_id: Uuid,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Type of run.
    pub operation: RunOperation,
    /// Configuration hash at time of the run.
    pub config_hash: String,
    /// Resources created, updated or deleted.
    pub changed: Vec<String>,
    /// Number of failed resources.
    pub failed: usize,
    /// Number of skipped or cancelled resources.
    pub not_attempted: usize,
    /// Whether every operation succeeded.
    pub success: bool,
}

/// Types of runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOperation {
    /// Converge to the declaration file.
    Apply,
    /// Tear down every recorded resource.
    Destroy,
}

impl DeploymentId {
    /// Creates a deployment identifier.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            project: project.to_string(),
            environment: environment.to_string(),
        }
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.environment)
    }
}

impl DeploymentState {
    /// Creates a new empty deployment state.
    #[must_use]
    pub fn new(deployment: DeploymentId) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            deployment,
            serial: 0,
            config_hash: String::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Returns true if no resource is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Gets a record by name.
    #[must_use]
    pub fn get_record(&self, name: &str) -> Option<&StateRecord> {
        self.resources.get(name)
    }

    /// Adds or replaces a record.
    pub fn set_record(&mut self, record: StateRecord) {
        self.resources.insert(record.name.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record by name.
    pub fn remove_record(&mut self, name: &str) -> Option<StateRecord> {
        let result = self.resources.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Returns the outputs of every recorded resource.
    #[must_use]
    pub fn resource_outputs(&self) -> BTreeMap<String, Outputs> {
        self.resources
            .iter()
            .map(|(name, record)| (name.clone(), record.outputs.clone()))
            .collect()
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            let excess = self.history.len() + 1 - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.history.push(entry);
    }
}

impl StateRecord {
    /// Creates a record for a freshly applied resource.
    #[must_use]
    pub fn new(name: &str, resource_type: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            properties: BTreeMap::new(),
            inputs: BTreeMap::new(),
            outputs: Outputs::new(),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a successful create or update.
    pub fn applied(
        &mut self,
        properties: BTreeMap<String, Value>,
        inputs: BTreeMap<String, Value>,
        outputs: Outputs,
        dependencies: Vec<String>,
    ) {
        self.properties = properties;
        self.inputs = inputs;
        self.outputs = outputs;
        self.dependencies = dependencies;
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history_entry() -> HistoryEntry {
        HistoryEntry {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation: RunOperation::Apply,
            config_hash: String::from("abc"),
            changed: vec![],
            failed: 0,
            not_attempted: 0,
            success: true,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        for _ in 0..(MAX_HISTORY + 5) {
            state.add_history(history_entry());
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
    }

    #[test]
    fn test_record_roundtrip_through_json() {
        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        let mut record = StateRecord::new("bucket1", "storage:bucket");
        record.applied(
            BTreeMap::from([(String::from("acl"), json!("private"))]),
            BTreeMap::from([(String::from("acl"), json!("private"))]),
            Outputs::from([(String::from("id"), json!("bucket1-1234abcd"))]),
            vec![],
        );
        state.set_record(record.clone());

        let text = serde_json::to_string(&state).expect("serialize");
        let parsed: DeploymentState = serde_json::from_str(&text).expect("deserialize");

        assert_eq!(parsed.get_record("bucket1"), Some(&record));
        assert_eq!(
            parsed.resource_outputs()["bucket1"]["id"],
            json!("bucket1-1234abcd")
        );
    }

    #[test]
    fn test_deployment_id_display() {
        assert_eq!(DeploymentId::new("demo", "prod").to_string(), "demo/prod");
    }
}
