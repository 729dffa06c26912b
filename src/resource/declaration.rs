//! Resource and stack output declarations.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{DeployConfig, ResourceConfig};
use crate::error::{ConfigError, ExecutionError};

use super::Outputs;
use super::value::{OutputRef, PropertyValue};

/// A declared resource: the desired state of one unit of infrastructure.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    /// Logical name, unique within a deployment.
    pub name: String,
    /// Provider type tag (e.g. `storage:bucket`).
    pub resource_type: String,
    /// Declared properties.
    pub properties: BTreeMap<String, PropertyValue>,
    /// Explicit ordering dependencies in addition to output references.
    pub depends_on: Vec<String>,
}

/// A stack output exported after apply.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDeclaration {
    /// Output name.
    pub name: String,
    /// Value, usually a reference to a resource output.
    pub value: PropertyValue,
}

impl ResourceDeclaration {
    /// Creates a declaration with no properties.
    #[must_use]
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Adds an explicit dependency.
    #[must_use]
    pub fn with_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Builds a declaration from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a property contains a malformed reference.
    pub fn from_config(config: &ResourceConfig, index: usize) -> Result<Self, ConfigError> {
        let properties = config
            .properties
            .iter()
            .map(|(key, value)| {
                let location = format!("resources[{index}].properties.{key}");
                PropertyValue::parse(value, &location).map(|v| (key.clone(), v))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            resource_type: config.resource_type.clone(),
            properties,
            depends_on: config.depends_on.clone(),
        })
    }

    /// Returns every output reference in the declared properties.
    #[must_use]
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            value.collect_references(&mut refs);
        }
        refs
    }

    /// Returns the names of all resources this one depends on.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.references()
            .into_iter()
            .map(|r| r.resource.as_str())
            .chain(self.depends_on.iter().map(String::as_str))
            .collect()
    }

    /// Returns the properties in canonical declared form.
    #[must_use]
    pub fn declared_properties(&self) -> BTreeMap<String, Value> {
        self.properties
            .iter()
            .map(|(key, value)| (key.clone(), value.to_declared()))
            .collect()
    }

    /// Resolves all properties against dependency outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced output is missing.
    pub fn resolve_properties(
        &self,
        outputs: &BTreeMap<String, Outputs>,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        self.properties
            .iter()
            .map(|(key, value)| value.resolve(outputs).map(|v| (key.clone(), v)))
            .collect()
    }
}

impl OutputDeclaration {
    /// Returns the output references in the value.
    #[must_use]
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.value.collect_references(&mut refs);
        refs
    }
}

/// Builds the ordered resource declarations of a configuration.
///
/// # Errors
///
/// Returns an error if any property contains a malformed reference.
pub fn declarations_from_config(config: &DeployConfig) -> Result<Vec<ResourceDeclaration>, ConfigError> {
    config
        .resources
        .iter()
        .enumerate()
        .map(|(index, resource)| ResourceDeclaration::from_config(resource, index))
        .collect()
}

/// Builds the stack output declarations of a configuration.
///
/// # Errors
///
/// Returns an error if an output contains a malformed reference.
pub fn outputs_from_config(config: &DeployConfig) -> Result<Vec<OutputDeclaration>, ConfigError> {
    config
        .outputs
        .iter()
        .map(|(name, value)| {
            PropertyValue::parse(value, &format!("outputs.{name}")).map(|value| OutputDeclaration {
                name: name.clone(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource_config(name: &str, properties: Value) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            resource_type: String::from("storage:bucket"),
            properties: serde_json::from_value(properties).expect("properties map"),
            depends_on: vec![String::from("network")],
        }
    }

    #[test]
    fn test_from_config_collects_dependencies() {
        let config = resource_config(
            "bucket2",
            json!({ "acl": "private", "log_target": "${bucket1.id}", "copy_of": "${bucket1.arn}" }),
        );

        let decl = ResourceDeclaration::from_config(&config, 1).expect("valid declaration");

        assert_eq!(decl.references().len(), 2);
        let deps: Vec<&str> = decl.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["bucket1", "network"]);
    }

    #[test]
    fn test_from_config_reports_location() {
        let config = resource_config("bucket2", json!({ "acl": "${oops}" }));

        let err = ResourceDeclaration::from_config(&config, 4).expect_err("invalid reference");
        assert!(err.to_string().contains("resources[4].properties.acl"));
    }

    #[test]
    fn test_resolve_properties() {
        let decl = ResourceDeclaration::new("bucket2", "storage:bucket")
            .with_property("acl", PropertyValue::literal("private"))
            .with_property("source", PropertyValue::output("bucket1", "id"));

        let outputs = BTreeMap::from([(
            String::from("bucket1"),
            Outputs::from([(String::from("id"), json!("bucket1-0001"))]),
        )]);

        let resolved = decl.resolve_properties(&outputs).expect("resolves");
        assert_eq!(resolved.get("source"), Some(&json!("bucket1-0001")));
        assert_eq!(decl.declared_properties().get("source"), Some(&json!("${bucket1.id}")));
    }
}
