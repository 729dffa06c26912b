//! Fingerprint of a declaration file.
//!
//! The hash is recorded with the state after each successful run so
//! `state show` can tell whether the declarations changed since.

use sha2::{Digest, Sha256};

use super::spec::{DeployConfig, ResourceConfig};

/// Computes SHA-256 fingerprints of declarations.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hex digest of the project identity, resources and outputs.
    ///
    /// Engine tuning is left out: concurrency and retry settings do not
    /// change what gets deployed.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut digest = Sha256::new();
        field(&mut digest, &config.project.name);
        field(&mut digest, &config.project.environment);

        for resource in &config.resources {
            digest.update(self.hash_resource(resource).as_bytes());
        }
        for (name, value) in &config.outputs {
            field(&mut digest, name);
            field(&mut digest, &value.to_string());
        }

        hex::encode(digest.finalize())
    }

    /// Hex digest of one resource declaration. `depends_on` order and
    /// duplicates do not affect it.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceConfig) -> String {
        let mut digest = Sha256::new();
        field(&mut digest, &resource.name);
        field(&mut digest, &resource.resource_type);

        // serde_json maps are key-sorted
        for (key, value) in &resource.properties {
            field(&mut digest, key);
            field(&mut digest, &value.to_string());
        }

        let mut depends_on: Vec<&String> = resource.depends_on.iter().collect();
        depends_on.sort_unstable();
        depends_on.dedup();
        for dependency in depends_on {
            field(&mut digest, dependency);
        }

        hex::encode(digest.finalize())
    }
}

/// Feeds `value` followed by a NUL separator.
fn field(digest: &mut Sha256, value: &str) {
    digest.update(value.as_bytes());
    digest.update([0u8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn create_test_resource(name: &str) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            resource_type: String::from("storage:bucket"),
            properties: BTreeMap::from([(String::from("acl"), json!("private"))]),
            depends_on: vec![],
        }
    }

    #[test]
    fn test_resource_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let resource = create_test_resource("bucket1");

        assert_eq!(hasher.hash_resource(&resource), hasher.hash_resource(&resource));
    }

    #[test]
    fn test_different_resources_different_hash() {
        let hasher = ConfigHasher::new();
        let first = create_test_resource("bucket1");
        let mut second = create_test_resource("bucket1");
        second
            .properties
            .insert(String::from("acl"), json!("public-read"));

        assert_ne!(hasher.hash_resource(&first), hasher.hash_resource(&second));
    }

    #[test]
    fn test_engine_settings_do_not_change_config_hash() {
        let hasher = ConfigHasher::new();
        let mut config: DeployConfig =
            serde_yaml::from_str("project:\n  name: demo\n").expect("valid yaml");
        config.resources.push(create_test_resource("bucket1"));
        let before = hasher.hash_config(&config);

        config.engine.max_concurrency = 16;
        assert_eq!(hasher.hash_config(&config), before);

        config.resources.push(create_test_resource("bucket2"));
        assert_ne!(hasher.hash_config(&config), before);
    }

    #[test]
    fn test_depends_on_order_ignored() {
        let hasher = ConfigHasher::new();
        let mut first = create_test_resource("bucket3");
        first.depends_on = vec![String::from("a"), String::from("b")];
        let mut second = create_test_resource("bucket3");
        second.depends_on = vec![String::from("b"), String::from("a")];

        assert_eq!(hasher.hash_resource(&first), hasher.hash_resource(&second));
    }
}
