//! Configuration validation for declaration files.
//!
//! This module validates configuration values before any planning happens.
//! Structural problems in the dependency graph (cycles, dangling references)
//! are reported by the graph builder instead.

use crate::error::{CairnError, ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DeployConfig, EngineConfig, ProjectConfig, ResourceConfig};
use crate::resource::PropertyValue;

/// Upper bound accepted for `engine.max_concurrency`.
const MAX_CONCURRENCY_LIMIT: usize = 256;

/// Upper bound accepted for `engine.retry.max_attempts`.
const MAX_ATTEMPTS_LIMIT: u32 = 20;

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Type tags known to the caller; empty disables the check.
    known_types: HashSet<String>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that accepts any type tag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator that only accepts the given type tags.
    #[must_use]
    pub fn with_known_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates a deployment configuration.
    ///
    /// Collects every problem first and returns the first error, so callers
    /// that want the full list can use [`ConfigValidator::check`].
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(CairnError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Validates a configuration and returns all errors and warnings.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_engine(&config.engine, &mut result);
        self.validate_resources(&config.resources, &mut result);
        Self::validate_outputs(config, &mut result);

        result
    }

    /// Validates project configuration.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.push_error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.push_error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.push_error("project.environment", "Environment cannot be empty");
        } else if !is_valid_name(&project.environment) {
            result.push_error(
                "project.environment",
                format!(
                    "Environment '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.environment
                ),
            );
        }
    }

    /// Validates engine tuning.
    fn validate_engine(engine: &EngineConfig, result: &mut ValidationResult) {
        if engine.max_concurrency == 0 {
            result.push_error("engine.max_concurrency", "Concurrency must be at least 1");
        } else if engine.max_concurrency > MAX_CONCURRENCY_LIMIT {
            result.push_error(
                "engine.max_concurrency",
                format!("Concurrency cannot exceed {MAX_CONCURRENCY_LIMIT}"),
            );
        }

        let retry = &engine.retry;
        if retry.max_attempts == 0 {
            result.push_error("engine.retry.max_attempts", "At least one attempt is required");
        } else if retry.max_attempts > MAX_ATTEMPTS_LIMIT {
            result.push_error(
                "engine.retry.max_attempts",
                format!("Attempts cannot exceed {MAX_ATTEMPTS_LIMIT}"),
            );
        }

        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            result.push_error(
                "engine.retry.multiplier",
                "Backoff multiplier must be a finite number >= 1.0",
            );
        }

        if retry.initial_backoff_ms > retry.max_backoff_ms {
            result.push_error(
                "engine.retry.initial_backoff_ms",
                "Initial backoff cannot exceed max_backoff_ms",
            );
        }
    }

    /// Validates all resource declarations.
    fn validate_resources(&self, resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result.warnings.push(String::from("No resources declared in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !seen_names.insert(resource.name.as_str()) {
                result.push_error(
                    format!("{prefix}.name"),
                    format!("Duplicate resource name: {}", resource.name),
                );
            }

            if !is_valid_name(&resource.name) {
                result.push_error(
                    format!("{prefix}.name"),
                    format!(
                        "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.name
                    ),
                );
            }

            if !is_valid_type_tag(&resource.resource_type) {
                result.push_error(
                    format!("{prefix}.type"),
                    format!(
                        "Type '{}' is invalid. Expected '<package>:<kind>'.",
                        resource.resource_type
                    ),
                );
            } else if !self.known_types.is_empty()
                && !self.known_types.contains(&resource.resource_type)
            {
                result.push_error(
                    format!("{prefix}.type"),
                    format!("No provider registered for type '{}'", resource.resource_type),
                );
            }

            for (key, value) in &resource.properties {
                let location = format!("{prefix}.properties.{key}");
                if let Err(e) = PropertyValue::parse(value, &location) {
                    result.push_error(location, e.to_string());
                }
            }

            for dependency in &resource.depends_on {
                if dependency == &resource.name {
                    result.push_error(
                        format!("{prefix}.depends_on"),
                        format!("Resource '{}' cannot depend on itself", resource.name),
                    );
                }
            }
        }
    }

    /// Validates stack outputs.
    fn validate_outputs(config: &DeployConfig, result: &mut ValidationResult) {
        for (name, value) in &config.outputs {
            let location = format!("outputs.{name}");
            match PropertyValue::parse(value, &location) {
                Ok(PropertyValue::Literal(_)) => result
                    .warnings
                    .push(format!("Output '{name}' does not reference any resource")),
                Ok(_) => {}
                Err(e) => result.push_error(location, e.to_string()),
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if name.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    if name.contains("--") {
        return false;
    }

    true
}

/// Type tags look like `storage:bucket`.
fn is_valid_type_tag(tag: &str) -> bool {
    let Some((package, kind)) = tag.split_once(':') else {
        return false;
    };

    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    };

    valid_part(package) && valid_part(kind)
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
