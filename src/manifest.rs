//! Multi-document YAML manifests
//!
//! Rendered manifests are streams of Kubernetes-style objects separated by
//! `---`. Objects are kept as untyped [`serde_yaml::Value`]s; only `kind`,
//! `metadata.name` and `metadata.namespace` are ever interpreted here.

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Result, localize};

/// Parses a YAML stream into objects, skipping empty documents and
/// flattening `kind: List` wrappers.
pub fn parse_documents(data: &[u8]) -> Result<Vec<Value>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(data) {
        let value = Value::deserialize(document)
            .map_err(|e| localize::manifest_parse_failed(e.to_string()))?;
        push_object(&mut objects, value);
    }
    Ok(objects)
}

fn push_object(objects: &mut Vec<Value>, value: Value) {
    match value {
        Value::Null => {}
        Value::Mapping(_) if kind(&value) == Some("List") => {
            if let Some(Value::Sequence(items)) = value.get("items") {
                for item in items {
                    push_object(objects, item.clone());
                }
            }
        }
        other => objects.push(other),
    }
}

/// Serializes objects back into a single `---` separated stream.
pub fn to_yaml(objects: &[Value]) -> Result<String> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(object)?);
    }
    Ok(out)
}

pub fn kind(object: &Value) -> Option<&str> {
    object.get("kind").and_then(Value::as_str)
}

pub fn api_version(object: &Value) -> Option<&str> {
    object.get("apiVersion").and_then(Value::as_str)
}

pub fn name(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
}

pub fn namespace(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
}

/// Drops the `Namespace` object named `namespace`, keeping everything else.
pub fn strip_namespace(objects: Vec<Value>, namespace: &str) -> Vec<Value> {
    objects
        .into_iter()
        .filter(|o| !(kind(o) == Some("Namespace") && name(o) == Some(namespace)))
        .collect()
}
