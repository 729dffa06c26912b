//! Resource declarations and typed output references.
//!
//! A declaration's property values are parsed once into [`PropertyValue`]
//! trees. References to other resources' outputs become [`OutputRef`]
//! handles that the executor resolves after the referenced resource has been
//! applied.

mod declaration;
mod value;

use std::collections::BTreeMap;

pub use declaration::{OutputDeclaration, ResourceDeclaration, declarations_from_config, outputs_from_config};
pub use value::{OutputRef, PropertyValue, Segment, REF_KEY};

/// Outputs computed by a provider, keyed by output name.
pub type Outputs = BTreeMap<String, serde_json::Value>;
