//! Provider interface and built-in providers.
//!
//! A provider performs the create, update and delete operations for one
//! resource type. Providers are registered by type tag in a
//! [`ProviderRegistry`] at process start; the engine never looks them up
//! any other way.

mod bucket;
mod registry;
mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use bucket::{BUCKET_TYPE, BucketAcl, BucketProvider};
pub use registry::ProviderRegistry;
pub use value::{VALUE_TYPE, ValueProvider};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ProviderError;
use crate::resource::Outputs;
use crate::state::DeploymentId;

/// Operation requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new resource.
    Create,
    /// Update an existing resource in place.
    Update,
    /// Delete an existing resource.
    Delete,
}

/// A single provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Requested operation.
    pub operation: Operation,
    /// Deployment the resource belongs to.
    pub deployment: DeploymentId,
    /// Type tag of the resource.
    pub resource_type: String,
    /// Logical name of the resource.
    pub name: String,
    /// Resolved properties. For deletes, the last applied inputs.
    pub properties: BTreeMap<String, Value>,
    /// Outputs recorded by the previous apply, if any.
    pub prior_outputs: Option<Outputs>,
    /// Names of the properties that changed (updates only).
    pub changed_fields: Vec<String>,
}

/// A resource provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Performs the requested operation and returns the resource outputs.
    ///
    /// Deletes return an empty output map.
    async fn apply(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError>;
}

impl ProviderRequest {
    /// Returns a property as a string, if present and a string.
    #[must_use]
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Returns a prior output as a string, if present and a string.
    #[must_use]
    pub fn prior_str(&self, key: &str) -> Option<&str> {
        self.prior_outputs
            .as_ref()
            .and_then(|outputs| outputs.get(key))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{op}")
    }
}
