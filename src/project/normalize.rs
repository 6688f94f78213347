//! YAML to JSON normalization.
//!
//! Metadata files are YAML, which allows mapping keys that are not strings
//! (`2: foo`, `true: bar`). Records are JSON-shaped, so every key is coerced
//! to its scalar text and every value is rebuilt as a `serde_json::Value`.

use serde_json::{Map, Number, Value};
use serde_yaml::Value as Yaml;
use thiserror::Error;

/// Reasons a YAML document has no JSON-compatible form.
#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("mapping key must be a scalar, found {0}")]
    NonScalarKey(&'static str),
    #[error("number {0} has no JSON representation")]
    NonFiniteNumber(String),
}

fn kind(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "bool",
        Yaml::Number(_) => "number",
        Yaml::String(_) => "string",
        Yaml::Sequence(_) => "sequence",
        Yaml::Mapping(_) => "mapping",
        Yaml::Tagged(_) => "tagged value",
    }
}

/// Coerce a mapping key to a string.
fn key_to_string(key: Yaml) -> Result<String, NormalizeError> {
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        Yaml::Tagged(tagged) => key_to_string(tagged.value),
        other => Err(NormalizeError::NonScalarKey(kind(&other))),
    }
}

fn number_to_json(n: serde_yaml::Number) -> Result<Number, NormalizeError> {
    if let Some(i) = n.as_i64() {
        return Ok(Number::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Number::from(u));
    }
    n.as_f64()
        .and_then(Number::from_f64)
        .ok_or_else(|| NormalizeError::NonFiniteNumber(n.to_string()))
}

/// Recursively convert a YAML value into the JSON model.
pub fn yaml_to_json(value: Yaml) -> Result<Value, NormalizeError> {
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => Value::Number(number_to_json(n)?),
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                object.insert(key_to_string(key)?, yaml_to_json(value)?);
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}
