//! Type tag to provider registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::Provider;
use super::bucket::{BUCKET_TYPE, BucketProvider};
use super::value::{VALUE_TYPE, ValueProvider};

/// Registry of providers keyed by resource type tag.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in providers.
    ///
    /// Buckets are created under `bucket_root`.
    #[must_use]
    pub fn with_builtins(bucket_root: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(BUCKET_TYPE, Arc::new(BucketProvider::new(bucket_root)));
        registry.register(VALUE_TYPE, Arc::new(ValueProvider));
        registry
    }

    /// Registers a provider, replacing any previous one for the tag.
    pub fn register(&mut self, type_tag: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(type_tag.into(), provider);
    }

    /// Looks up the provider for a type tag.
    #[must_use]
    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(type_tag).cloned()
    }

    /// Returns true if a provider is registered for the tag.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.providers.contains_key(type_tag)
    }

    /// Returns the registered type tags, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_builtins_registered() {
        let registry = ProviderRegistry::with_builtins("/tmp/cairn-buckets");
        assert_eq!(registry.types(), vec!["core:value", "storage:bucket"]);
        assert!(registry.get("storage:bucket").is_some());
        assert!(registry.get("cloud:queue").is_none());
    }

    #[test]
    fn test_register_custom_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register("cloud:queue", Arc::new(MockProvider::new()));
        assert!(registry.contains("cloud:queue"));
    }
}
