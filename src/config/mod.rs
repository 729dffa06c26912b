//! Configuration module for the Cairn orchestration engine.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `cairn.yaml`
//! - Validation of configuration values
//! - Computing configuration hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    DEFAULT_BUCKET_ROOT, DEFAULT_STATE_DIR, DeployConfig, EngineConfig, ProjectConfig,
    ProvidersConfig, ResourceConfig, RetryConfig, StateBackend, StateConfig,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
