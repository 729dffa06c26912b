//! Property values with embedded output references.
//!
//! Three spellings reference another resource's output:
//!
//! - `"${bucket.id}"`: the whole value is replaced by the output value.
//! - `"logs-${bucket.id}"`: the output is rendered into the string.
//! - `{ "$ref": "bucket.id" }`: structural form of the first spelling.
//!
//! `$${` escapes a literal `${`.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, ExecutionError};

use super::Outputs;

/// Map key of the structural reference form.
pub const REF_KEY: &str = "$ref";

/// Typed handle to one output of another resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputRef {
    /// Logical name of the referenced resource.
    pub resource: String,
    /// Output name on that resource.
    pub output: String,
}

/// Piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Text(String),
    /// Rendered output value.
    Output(OutputRef),
}

/// A declared property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A scalar JSON value (null, bool, number, or string without references).
    Literal(Value),
    /// A list of values.
    List(Vec<PropertyValue>),
    /// A map of values.
    Map(BTreeMap<String, PropertyValue>),
    /// The value of another resource's output.
    Output(OutputRef),
    /// A string with outputs interpolated into it.
    Template(Vec<Segment>),
}

impl OutputRef {
    /// Creates a reference to `resource.output`.
    #[must_use]
    pub fn new(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            output: output.into(),
        }
    }

    /// Parses `resource.output`.
    ///
    /// # Errors
    ///
    /// Returns the reason the text is not a valid reference.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let text = text.trim();
        let Some((resource, output)) = text.split_once('.') else {
            return Err(String::from("expected '<resource>.<output>'"));
        };

        if resource.is_empty() || !resource.chars().all(is_name_char) {
            return Err(format!("'{resource}' is not a valid resource name"));
        }
        if output.is_empty() || !output.chars().all(is_name_char) {
            return Err(format!("'{output}' is not a valid output name"));
        }

        Ok(Self::new(resource, output))
    }
}

/// Writes `${` in literal strings back as `$${` so a literal never renders
/// like a reference.
fn escape_literal(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.replace("${", "$${")),
        Value::Array(items) => Value::Array(items.iter().map(escape_literal).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), escape_literal(item)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource, self.output)
    }
}

impl PropertyValue {
    /// Creates a literal value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a whole-value output reference.
    #[must_use]
    pub fn output(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Output(OutputRef::new(resource, output))
    }

    /// Parses a declared JSON value, extracting output references.
    ///
    /// `location` names the value in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is malformed.
    pub fn parse(value: &Value, location: &str) -> Result<Self, ConfigError> {
        match value {
            Value::String(text) => parse_string(text, location),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Self::parse(item, &format!("{location}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(map) => {
                if map.len() == 1
                    && let Some(target) = map.get(REF_KEY)
                {
                    return parse_structural_ref(target, location);
                }

                map.iter()
                    .map(|(key, item)| {
                        Self::parse(item, &format!("{location}.{key}")).map(|v| (key.clone(), v))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()
                    .map(Self::Map)
            }
            scalar => Ok(Self::Literal(scalar.clone())),
        }
    }

    /// Appends every output reference in this value to `refs`.
    pub fn collect_references<'a>(&'a self, refs: &mut Vec<&'a OutputRef>) {
        match self {
            Self::Literal(_) => {}
            Self::List(items) => items.iter().for_each(|item| item.collect_references(refs)),
            Self::Map(map) => map.values().for_each(|item| item.collect_references(refs)),
            Self::Output(reference) => refs.push(reference),
            Self::Template(segments) => {
                for segment in segments {
                    if let Segment::Output(reference) = segment {
                        refs.push(reference);
                    }
                }
            }
        }
    }

    /// Renders the value in canonical declared form.
    ///
    /// References are written back as `${resource.output}` strings, so two
    /// declarations that mean the same thing compare equal.
    #[must_use]
    pub fn to_declared(&self) -> Value {
        match self {
            Self::Literal(value) => escape_literal(value),
            Self::List(items) => Value::Array(items.iter().map(Self::to_declared).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.to_declared()))
                    .collect(),
            ),
            Self::Output(reference) => Value::String(format!("${{{reference}}}")),
            Self::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(literal) => text.push_str(&literal.replace("${", "$${")),
                        Segment::Output(reference) => text.push_str(&format!("${{{reference}}}")),
                    }
                }
                Value::String(text)
            }
        }
    }

    /// Resolves references against the outputs of applied resources.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::MissingOutput`] if a referenced output is not
    /// present in `outputs`.
    pub fn resolve(&self, outputs: &BTreeMap<String, Outputs>) -> Result<Value, ExecutionError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::List(items) => items
                .iter()
                .map(|item| item.resolve(outputs))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Map(map) => map
                .iter()
                .map(|(key, item)| item.resolve(outputs).map(|v| (key.clone(), v)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(Value::Object),
            Self::Output(reference) => lookup(reference, outputs).cloned(),
            Self::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(literal) => text.push_str(literal),
                        Segment::Output(reference) => match lookup(reference, outputs)? {
                            Value::String(s) => text.push_str(s),
                            Value::Null => {}
                            other => text.push_str(&other.to_string()),
                        },
                    }
                }
                Ok(Value::String(text))
            }
        }
    }
}

fn lookup<'a>(
    reference: &OutputRef,
    outputs: &'a BTreeMap<String, Outputs>,
) -> Result<&'a Value, ExecutionError> {
    outputs
        .get(&reference.resource)
        .and_then(|o| o.get(&reference.output))
        .ok_or_else(|| ExecutionError::MissingOutput {
            resource: reference.resource.clone(),
            output: reference.output.clone(),
        })
}

fn invalid(reference: &str, location: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidReference {
        reference: reference.to_string(),
        location: location.to_string(),
        reason: reason.into(),
    }
}

fn parse_structural_ref(target: &Value, location: &str) -> Result<PropertyValue, ConfigError> {
    let Value::String(text) = target else {
        return Err(invalid(&target.to_string(), location, "'$ref' must be a string"));
    };

    OutputRef::parse(text)
        .map(PropertyValue::Output)
        .map_err(|reason| invalid(text, location, reason))
}

fn parse_string(text: &str, location: &str) -> Result<PropertyValue, ConfigError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        // `$${` is an escaped `${`
        if rest[..start].ends_with('$') {
            literal.push_str(&rest[..start - 1]);
            literal.push_str("${");
            rest = &rest[start + 2..];
            continue;
        }

        literal.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(invalid(text, location, "unterminated '${'"));
        };

        let inner = &after[..end];
        let reference = OutputRef::parse(inner).map_err(|reason| invalid(inner, location, reason))?;

        if !literal.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Output(reference));
        rest = &after[end + 1..];
    }

    literal.push_str(rest);

    if segments.is_empty() {
        return Ok(PropertyValue::Literal(Value::String(literal)));
    }
    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }

    match segments.as_slice() {
        [Segment::Output(reference)] => Ok(PropertyValue::Output(reference.clone())),
        _ => Ok(PropertyValue::Template(segments)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: &Value) -> PropertyValue {
        PropertyValue::parse(value, "test").expect("value should parse")
    }

    #[test]
    fn test_plain_string_is_literal() {
        assert_eq!(parse(&json!("private")), PropertyValue::literal("private"));
    }

    #[test]
    fn test_whole_string_reference() {
        assert_eq!(
            parse(&json!("${bucket1.id}")),
            PropertyValue::output("bucket1", "id")
        );
    }

    #[test]
    fn test_structural_reference() {
        assert_eq!(
            parse(&json!({ "$ref": "bucket1.arn" })),
            PropertyValue::output("bucket1", "arn")
        );
    }

    #[test]
    fn test_interpolated_string() {
        let value = parse(&json!("logs-${bucket1.id}/raw"));
        assert_eq!(
            value,
            PropertyValue::Template(vec![
                Segment::Text(String::from("logs-")),
                Segment::Output(OutputRef::new("bucket1", "id")),
                Segment::Text(String::from("/raw")),
            ])
        );
    }

    #[test]
    fn test_escaped_interpolation_stays_literal() {
        assert_eq!(parse(&json!("cost: $${price}")), PropertyValue::literal("cost: ${price}"));
    }

    #[test]
    fn test_nested_references_are_collected() {
        let value = parse(&json!({
            "tags": { "owner": "${team.name}" },
            "targets": ["${a.id}", "static", { "$ref": "b.id" }]
        }));

        let mut refs = Vec::new();
        value.collect_references(&mut refs);
        let names: Vec<String> = refs.iter().map(ToString::to_string).collect();

        assert_eq!(names, vec!["team.name", "a.id", "b.id"]);
    }

    #[test]
    fn test_malformed_references_are_rejected() {
        assert!(PropertyValue::parse(&json!("${bucket1}"), "p").is_err());
        assert!(PropertyValue::parse(&json!("${bucket1.id"), "p").is_err());
        assert!(PropertyValue::parse(&json!("${.id}"), "p").is_err());
        assert!(PropertyValue::parse(&json!({ "$ref": 3 }), "p").is_err());
    }

    #[test]
    fn test_declared_form_is_canonical() {
        let structural = parse(&json!({ "$ref": "bucket1.id" }));
        let textual = parse(&json!("${bucket1.id}"));
        assert_eq!(structural.to_declared(), textual.to_declared());

        let escaped = parse(&json!("a $${b} ${c.d}"));
        assert_eq!(escaped.to_declared(), json!("a $${b} ${c.d}"));

        let literal = parse(&json!("$${bucket1.id}"));
        assert_eq!(literal, PropertyValue::literal("${bucket1.id}"));
        assert_eq!(literal.to_declared(), json!("$${bucket1.id}"));
        assert_eq!(
            PropertyValue::literal(json!({ "cmd": ["echo ${HOME}"] })).to_declared(),
            json!({ "cmd": ["echo $${HOME}"] })
        );
    }

    #[test]
    fn test_resolve_replaces_references() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            String::from("bucket1"),
            Outputs::from([
                (String::from("id"), json!("bucket1-abc")),
                (String::from("size"), json!(3)),
            ]),
        );

        let whole = parse(&json!("${bucket1.size}"));
        assert_eq!(whole.resolve(&outputs).expect("resolves"), json!(3));

        let template = parse(&json!("s3://${bucket1.id}/${bucket1.size}"));
        assert_eq!(
            template.resolve(&outputs).expect("resolves"),
            json!("s3://bucket1-abc/3")
        );

        let missing = parse(&json!("${bucket1.arn}"));
        assert!(matches!(
            missing.resolve(&outputs),
            Err(ExecutionError::MissingOutput { .. })
        ));
    }
}
