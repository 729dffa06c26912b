//! Configuration schema types.
//!
//! This module defines the structs that map to the `cairn.yaml` declaration
//! file. The file fully describes the desired state of one deployment.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::state::DeploymentId;

/// Default state directory, relative to the configuration file.
pub const DEFAULT_STATE_DIR: &str = ".cairn";

/// Default directory for the built-in bucket provider.
pub const DEFAULT_BUCKET_ROOT: &str = ".cairn/buckets";

/// The root configuration structure for a Cairn deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Execution engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Built-in provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Declared resources, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Stack outputs exported after apply.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackend,
    /// Base directory for the local backend.
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// In-process storage; nothing survives the process.
    Memory,
}

/// Execution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maximum simultaneous provider operations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry policy for retryable provider failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Settings for the built-in providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvidersConfig {
    /// Directory holding `storage:bucket` buckets.
    #[serde(default)]
    pub bucket_root: Option<String>,
}

/// A single resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Logical name, unique within the deployment.
    pub name: String,
    /// Provider type tag.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Declared properties; strings may reference other resources' outputs.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Explicit ordering dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_environment() -> String {
    String::from("dev")
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl DeployConfig {
    /// Returns the deployment this configuration describes.
    #[must_use]
    pub fn deployment_id(&self) -> DeploymentId {
        DeploymentId::new(&self.project.name, &self.project.environment)
    }

    /// Returns the local state directory, resolved against `base`.
    #[must_use]
    pub fn state_dir(&self, base: &std::path::Path) -> PathBuf {
        base.join(self.state.path.as_deref().unwrap_or(DEFAULT_STATE_DIR))
    }

    /// Returns the bucket provider root, resolved against `base`.
    #[must_use]
    pub fn bucket_root(&self, base: &std::path::Path) -> PathBuf {
        base.join(
            self.providers
                .bucket_root
                .as_deref()
                .unwrap_or(DEFAULT_BUCKET_ROOT),
        )
    }

    /// Finds a resource declaration by name.
    #[must_use]
    pub fn get_resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}
