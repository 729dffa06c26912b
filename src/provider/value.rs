//! `core:value` provider: a resource whose outputs are its own properties.

use async_trait::async_trait;
use serde_json::Value;

use super::{Operation, Provider, ProviderRequest};
use crate::error::ProviderError;
use crate::resource::Outputs;

/// Type tag of the value provider.
pub const VALUE_TYPE: &str = "core:value";

/// Pass-through provider: outputs are the resolved properties plus `id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueProvider;

#[async_trait]
impl Provider for ValueProvider {
    async fn apply(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        if request.operation == Operation::Delete {
            return Ok(Outputs::new());
        }

        let mut outputs: Outputs = request.properties.clone();
        outputs.insert(String::from("id"), Value::String(request.name.clone()));
        Ok(outputs)
    }
}
